#![forbid(unsafe_code)]

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolEvent;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use thiserror::Error;

use crate::chain::RawLog;
use crate::core::model::OrderType;

pub(crate) mod abi {
    alloy_sol_types::sol! {
        struct Asset {
            uint256 tokenId;
            address collection;
            uint96 amount;
        }

        struct Order {
            uint8 side;
            uint8 saleKind;
            address maker;
            Asset nft;
            uint128 price;
            uint64 expiry;
            uint64 salt;
        }

        event LogMake(
            bytes32 orderKey,
            uint8 indexed side,
            uint8 indexed saleKind,
            address indexed maker,
            Asset nft,
            uint128 price,
            uint64 expiry,
            uint64 salt
        );

        event LogCancel(bytes32 indexed orderKey, address indexed maker);

        event LogMatch(
            bytes32 indexed makeOrderKey,
            bytes32 indexed takeOrderKey,
            Order makeOrder,
            Order takeOrder,
            uint128 fillPrice
        );
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("abi decode failed: {0}")]
    Abi(#[from] alloy_sol_types::Error),
    #[error("unknown order side {0}")]
    UnknownSide(u8),
    #[error("unknown sale kind {0}")]
    UnknownSaleKind(u8),
    #[error("{0} out of range")]
    OutOfRange(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    List,
    Bid,
}

impl TryFrom<u8> for Side {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::List),
            1 => Ok(Side::Bid),
            other => Err(DecodeError::UnknownSide(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleKind {
    FixedPriceForCollection,
    FixedPriceForItem,
}

impl TryFrom<u8> for SaleKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SaleKind::FixedPriceForCollection),
            1 => Ok(SaleKind::FixedPriceForItem),
            other => Err(DecodeError::UnknownSaleKind(other)),
        }
    }
}

pub fn classify(side: Side, sale_kind: SaleKind) -> OrderType {
    match (side, sale_kind) {
        (Side::List, _) => OrderType::Listing,
        (Side::Bid, SaleKind::FixedPriceForCollection) => OrderType::CollectionBid,
        (Side::Bid, SaleKind::FixedPriceForItem) => OrderType::ItemBid,
    }
}

/// Order fields normalized for storage: lowercase `0x` hex addresses, decimal
/// token ids, wei prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerms {
    pub side: Side,
    pub sale_kind: SaleKind,
    pub maker: String,
    pub collection: String,
    pub token_id: String,
    pub amount: i64,
    pub price: Decimal,
    pub expiry: i64,
    pub salt: Decimal,
}

impl OrderTerms {
    pub fn order_type(&self) -> OrderType {
        classify(self.side, self.sale_kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeEvent {
    pub order_id: String,
    pub terms: OrderTerms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelEvent {
    pub order_id: String,
    pub maker: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub make_order_id: String,
    pub take_order_id: String,
    pub make: OrderTerms,
    pub take: OrderTerms,
    pub fill_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderbookEvent {
    Make(MakeEvent),
    Cancel(CancelEvent),
    Match(MatchEvent),
    Unknown(Option<B256>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
}

impl From<&RawLog> for LogMeta {
    fn from(log: &RawLog) -> Self {
        Self {
            block_number: log.block(),
            tx_hash: format!("{:#x}", log.transaction_hash),
            log_index: log.index(),
        }
    }
}

/// First-topic hashes of the three tracked events, for the log filter.
pub fn tracked_topics() -> Vec<B256> {
    vec![
        abi::LogMake::SIGNATURE_HASH,
        abi::LogCancel::SIGNATURE_HASH,
        abi::LogMatch::SIGNATURE_HASH,
    ]
}

pub fn order_id(key: &B256) -> String {
    format!("{key:#x}")
}

pub fn address_hex(address: &Address) -> String {
    format!("{address:#x}")
}

fn price(value: u128) -> Result<Decimal, DecodeError> {
    Decimal::from_u128(value).ok_or(DecodeError::OutOfRange("price"))
}

fn expiry(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn terms(
    side: u8,
    sale_kind: u8,
    maker: &Address,
    nft: &abi::Asset,
    order_price: u128,
    order_expiry: u64,
    salt: u64,
) -> Result<OrderTerms, DecodeError> {
    Ok(OrderTerms {
        side: Side::try_from(side)?,
        sale_kind: SaleKind::try_from(sale_kind)?,
        maker: address_hex(maker),
        collection: address_hex(&nft.collection),
        token_id: nft.tokenId.to_string(),
        amount: i64::try_from(nft.amount).map_err(|_| DecodeError::OutOfRange("amount"))?,
        price: price(order_price)?,
        expiry: expiry(order_expiry),
        salt: Decimal::from(salt),
    })
}

fn order_terms(order: &abi::Order) -> Result<OrderTerms, DecodeError> {
    terms(
        order.side,
        order.saleKind,
        &order.maker,
        &order.nft,
        order.price,
        order.expiry,
        order.salt,
    )
}

pub fn decode_log(log: &RawLog) -> Result<OrderbookEvent, DecodeError> {
    let Some(topic0) = log.topics.first().copied() else {
        return Ok(OrderbookEvent::Unknown(None));
    };
    let topics = log.topics.iter().copied();

    if topic0 == abi::LogMake::SIGNATURE_HASH {
        let ev = abi::LogMake::decode_raw_log(topics, &log.data, true)?;
        let terms = terms(
            ev.side,
            ev.saleKind,
            &ev.maker,
            &ev.nft,
            ev.price,
            ev.expiry,
            ev.salt,
        )?;
        Ok(OrderbookEvent::Make(MakeEvent {
            order_id: order_id(&ev.orderKey),
            terms,
        }))
    } else if topic0 == abi::LogCancel::SIGNATURE_HASH {
        let ev = abi::LogCancel::decode_raw_log(topics, &log.data, true)?;
        Ok(OrderbookEvent::Cancel(CancelEvent {
            order_id: order_id(&ev.orderKey),
            maker: address_hex(&ev.maker),
        }))
    } else if topic0 == abi::LogMatch::SIGNATURE_HASH {
        let ev = abi::LogMatch::decode_raw_log(topics, &log.data, true)?;
        Ok(OrderbookEvent::Match(MatchEvent {
            make_order_id: order_id(&ev.makeOrderKey),
            take_order_id: order_id(&ev.takeOrderKey),
            make: order_terms(&ev.makeOrder)?,
            take: order_terms(&ev.takeOrder)?,
            fill_price: price(ev.fillPrice)?,
        }))
    } else {
        Ok(OrderbookEvent::Unknown(Some(topic0)))
    }
}


#[cfg(test)]
mod tests {
    use alloy_primitives::b256;

    use super::fixtures::{Terms, account, cancel_log, key, make_log, match_log};
    use super::*;

    const LOG_MAKE: B256 =
        b256!("0xfc37f2ff950f95913eb7182357ba3c14df60ef354bc7d6ab1ba2815f249fffe6");
    const LOG_CANCEL: B256 =
        b256!("0x0ac8bb53fac566d7afc05d8b4df11d7690a7b27bdc40b54e4060f9b21fb849bd");
    const LOG_MATCH: B256 =
        b256!("0xf629aecab94607bc43ce4aebd564bf6e61c7327226a797b002de724b9944b20e");

    fn listing_terms() -> Terms {
        Terms {
            side: 0,
            sale_kind: 1,
            maker: account(0xaa),
            collection: account(0xcc),
            token_id: 7,
            amount: 1,
            price: 100,
            expiry: 1_700_000_050,
            salt: 42,
        }
    }

    #[test]
    fn signature_hashes_match_the_exchange_abi() {
        assert_eq!(abi::LogMake::SIGNATURE_HASH, LOG_MAKE);
        assert_eq!(abi::LogCancel::SIGNATURE_HASH, LOG_CANCEL);
        assert_eq!(abi::LogMatch::SIGNATURE_HASH, LOG_MATCH);
        assert_eq!(tracked_topics(), vec![LOG_MAKE, LOG_CANCEL, LOG_MATCH]);
    }

    #[test]
    fn classifies_side_and_sale_kind() {
        assert_eq!(
            classify(Side::Bid, SaleKind::FixedPriceForCollection),
            OrderType::CollectionBid
        );
        assert_eq!(
            classify(Side::Bid, SaleKind::FixedPriceForItem),
            OrderType::ItemBid
        );
        assert_eq!(
            classify(Side::List, SaleKind::FixedPriceForCollection),
            OrderType::Listing
        );
    }

    #[test]
    fn decodes_make_with_normalized_fields() {
        let log = make_log(key(1), &listing_terms(), 10, 0xf1, 3);
        let OrderbookEvent::Make(make) = decode_log(&log).expect("decode") else {
            panic!("expected make");
        };
        assert_eq!(make.order_id, format!("0x{}", "01".repeat(32)));
        assert_eq!(make.terms.maker, format!("0x{}", "aa".repeat(20)));
        assert_eq!(make.terms.collection, format!("0x{}", "cc".repeat(20)));
        assert_eq!(make.terms.token_id, "7");
        assert_eq!(make.terms.price, Decimal::from(100));
        assert_eq!(make.terms.order_type(), OrderType::Listing);
        assert_eq!(make.terms.salt, Decimal::from(42));

        let meta = LogMeta::from(&log);
        assert_eq!(meta.block_number, 10);
        assert_eq!(meta.log_index, 3);
        assert_eq!(meta.tx_hash, format!("0x{}", "f1".repeat(32)));
    }

    #[test]
    fn decodes_cancel_from_topics() {
        let log = cancel_log(key(2), account(0xaa), 11, 0xf2, 0);
        let OrderbookEvent::Cancel(cancel) = decode_log(&log).expect("decode") else {
            panic!("expected cancel");
        };
        assert_eq!(cancel.order_id, format!("0x{}", "02".repeat(32)));
        assert_eq!(cancel.maker, format!("0x{}", "aa".repeat(20)));
    }

    #[test]
    fn decodes_match_orders() {
        let sell = listing_terms();
        let buy = Terms {
            side: 1,
            sale_kind: 1,
            maker: account(0xbb),
            ..listing_terms()
        };
        let log = match_log(key(3), key(1), &buy, &sell, 95, 12, 0xf3, 1);
        let OrderbookEvent::Match(m) = decode_log(&log).expect("decode") else {
            panic!("expected match");
        };
        assert_eq!(m.make.side, Side::Bid);
        assert_eq!(m.take.maker, format!("0x{}", "aa".repeat(20)));
        assert_eq!(m.fill_price, Decimal::from(95));
        assert_eq!(m.take_order_id, format!("0x{}", "01".repeat(32)));
    }

    #[test]
    fn unknown_topics_are_not_errors() {
        let mut log = cancel_log(key(2), account(0xaa), 11, 0xf2, 0);
        log.topics[0] = B256::repeat_byte(0x55);
        assert_eq!(
            decode_log(&log).expect("decode"),
            OrderbookEvent::Unknown(Some(B256::repeat_byte(0x55)))
        );
        log.topics.clear();
        assert_eq!(decode_log(&log).expect("decode"), OrderbookEvent::Unknown(None));
    }

    #[test]
    fn truncated_payload_is_a_decode_error() {
        let mut log = make_log(key(1), &listing_terms(), 10, 0xf1, 3);
        log.data = alloy_primitives::Bytes::from(log.data[..31].to_vec());
        assert!(matches!(decode_log(&log), Err(DecodeError::Abi(_))));
    }

    #[test]
    fn unknown_side_is_rejected() {
        let terms = Terms {
            side: 9,
            ..listing_terms()
        };
        let log = make_log(key(1), &terms, 10, 0xf1, 3);
        assert!(matches!(decode_log(&log), Err(DecodeError::UnknownSide(9))));
    }
}

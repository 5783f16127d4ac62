//! Bybit v5 public stream messages and their decoding into [`FeedEvent`]s.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    errors::{FeedError, FeedResult},
    market_maker::BookLevel,
};

/// Topic names subscribed for one symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    pub order_book: String,
    pub trade: String,
    pub ticker: String,
}

impl Topics {
    pub fn new(symbol: &str, order_book_levels: u32) -> Self {
        Self {
            order_book: format!("orderbook.{order_book_levels}.{symbol}"),
            trade: format!("publicTrade.{symbol}"),
            ticker: format!("tickers.{symbol}"),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [
            self.order_book.as_str(),
            self.trade.as_str(),
            self.ticker.as_str(),
        ]
    }
}

/// A decoded market update.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    Ticker { bid1: f64, ask1: f64 },
    Trade { price: f64 },
    OrderBook { bids: Vec<BookLevel>, asks: Vec<BookLevel> },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: Option<String>,
    op: Option<String>,
    success: Option<bool>,
    ret_msg: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    #[serde(rename = "bid1Price")]
    bid1_price: Option<String>,
    #[serde(rename = "ask1Price")]
    ask1_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TradeData {
    #[serde(rename = "p")]
    price: String,
}

#[derive(Debug, Deserialize)]
struct OrderBookData {
    #[serde(rename = "b", default)]
    bids: Vec<Vec<String>>,
    #[serde(rename = "a", default)]
    asks: Vec<Vec<String>>,
}

/// Decodes one text frame.
///
/// Returns `Ok(None)` for control replies (subscribe acks, pongs), unknown topics and
/// updates carrying nothing usable. A rejected subscription is an error.
pub fn decode_message(text: &str, topics: &Topics) -> FeedResult<Option<FeedEvent>> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let Some(topic) = envelope.topic else {
        if envelope.success == Some(false) {
            let reason = envelope.ret_msg.unwrap_or_default();
            return Err(FeedError::SubscriptionRejected(reason));
        }
        tracing::debug!(op = ?envelope.op, "control message");
        return Ok(None);
    };

    if topic == topics.ticker {
        let data: TickerData = serde_json::from_value(envelope.data)?;
        match (data.bid1_price, data.ask1_price) {
            (Some(bid), Some(ask)) => Ok(Some(FeedEvent::Ticker {
                bid1: parse_decimal("bid1Price", &bid),
                ask1: parse_decimal("ask1Price", &ask),
            })),
            _ => Ok(None),
        }
    } else if topic == topics.trade {
        let trades: Vec<TradeData> = serde_json::from_value(envelope.data)?;
        match trades.first() {
            Some(trade) => Ok(Some(FeedEvent::Trade {
                price: parse_decimal("p", &trade.price),
            })),
            None => {
                tracing::warn!(%topic, "trade message without trades");
                Ok(None)
            }
        }
    } else if topic == topics.order_book {
        let book: OrderBookData = serde_json::from_value(envelope.data)?;
        Ok(Some(FeedEvent::OrderBook {
            bids: parse_levels(&book.bids),
            asks: parse_levels(&book.asks),
        }))
    } else {
        tracing::debug!(%topic, "ignoring unsubscribed topic");
        Ok(None)
    }
}

/// Parses a decimal string; failures are logged and count as zero.
pub fn parse_decimal(field: &str, raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(field, raw, error = %err, "failed to parse decimal, using 0");
            0.0
        }
    }
}

fn parse_levels(raw: &[Vec<String>]) -> Vec<BookLevel> {
    raw.iter()
        .filter_map(|level| match level.as_slice() {
            [price, quantity, ..] => Some(BookLevel {
                price: parse_decimal("price", price),
                quantity: parse_decimal("quantity", quantity),
            }),
            _ => {
                tracing::warn!(?level, "skipping malformed order book level");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new("BTCUSDT", 50)
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(
            topics().all(),
            ["orderbook.50.BTCUSDT", "publicTrade.BTCUSDT", "tickers.BTCUSDT"]
        );
    }

    #[test]
    fn test_decode_ticker() {
        let text = r#"{"topic":"tickers.BTCUSDT","type":"snapshot","ts":1,"cs":2,
            "data":{"symbol":"BTCUSDT","lastPrice":"26080.1","bid1Price":"26080.10","ask1Price":"26080.20"}}"#;
        let event = decode_message(text, &topics()).unwrap();
        assert_eq!(
            event,
            Some(FeedEvent::Ticker {
                bid1: 26080.10,
                ask1: 26080.20
            })
        );
    }

    #[test]
    fn test_ticker_delta_without_top_of_book_is_skipped() {
        let text = r#"{"topic":"tickers.BTCUSDT","type":"delta","data":{"symbol":"BTCUSDT","lastPrice":"1"}}"#;
        assert_eq!(decode_message(text, &topics()).unwrap(), None);
    }

    #[test]
    fn test_malformed_decimal_counts_as_zero() {
        let text = r#"{"topic":"tickers.BTCUSDT","data":{"bid1Price":"abc","ask1Price":"10"}}"#;
        assert_eq!(
            decode_message(text, &topics()).unwrap(),
            Some(FeedEvent::Ticker {
                bid1: 0.0,
                ask1: 10.0
            })
        );
        assert_eq!(parse_decimal("p", " 1.5 "), 1.5);
        assert_eq!(parse_decimal("p", ""), 0.0);
    }

    #[test]
    fn test_decode_trade_uses_first_entry() {
        let text = r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":1,"data":[
            {"T":1,"s":"BTCUSDT","S":"Buy","v":"0.01","p":"26081.5","BT":false},
            {"T":1,"s":"BTCUSDT","S":"Sell","v":"0.02","p":"26070.0","BT":false}]}"#;
        assert_eq!(
            decode_message(text, &topics()).unwrap(),
            Some(FeedEvent::Trade { price: 26081.5 })
        );
        let empty = r#"{"topic":"publicTrade.BTCUSDT","data":[]}"#;
        assert_eq!(decode_message(empty, &topics()).unwrap(), None);
    }

    #[test]
    fn test_decode_order_book_skips_short_levels() {
        let text = r#"{"topic":"orderbook.50.BTCUSDT","type":"snapshot","data":{
            "s":"BTCUSDT","b":[["100.5","2"],["100.0"]],"a":[["101","3.5"]],"u":1,"seq":2}}"#;
        let event = decode_message(text, &topics()).unwrap();
        assert_eq!(
            event,
            Some(FeedEvent::OrderBook {
                bids: vec![BookLevel {
                    price: 100.5,
                    quantity: 2.0
                }],
                asks: vec![BookLevel {
                    price: 101.0,
                    quantity: 3.5
                }],
            })
        );
    }

    #[test]
    fn test_control_messages() {
        let ack = r#"{"success":true,"ret_msg":"","conn_id":"x","op":"subscribe"}"#;
        assert_eq!(decode_message(ack, &topics()).unwrap(), None);
        let pong = r#"{"success":true,"ret_msg":"pong","op":"ping"}"#;
        assert_eq!(decode_message(pong, &topics()).unwrap(), None);

        let rejected = r#"{"success":false,"ret_msg":"error:handler not found","op":"subscribe"}"#;
        assert!(matches!(
            decode_message(rejected, &topics()),
            Err(FeedError::SubscriptionRejected(reason)) if reason.contains("handler")
        ));
    }

    #[test]
    fn test_other_topics_and_bad_json() {
        let other = r#"{"topic":"tickers.ETHUSDT","data":{"bid1Price":"1","ask1Price":"2"}}"#;
        assert_eq!(decode_message(other, &topics()).unwrap(), None);
        assert!(matches!(
            decode_message("not json", &topics()),
            Err(FeedError::Json(_))
        ));
    }
}

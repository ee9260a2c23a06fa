use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Body of `POST /order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl NewOrder {
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }

    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }
}

/// Body of `DELETE /order`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: u64,
}

/// Body of `DELETE /order/all`; without a symbol every open order is cancelled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllOrders {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_order_wire_shape() {
        let order = NewOrder::limit("ETHUSDT", Side::Ask, 1.5, 101.0);
        assert_eq!(
            serde_json::to_string(&order).unwrap(),
            r#"{"symbol":"ETHUSDT","side":"ask","type":"limit","quantity":1.5,"price":101.0}"#
        );

        let market = NewOrder::market("BTCUSDT", Side::Bid, 0.1);
        let value = serde_json::to_value(&market).unwrap();
        assert_eq!(value["type"], "market");
        assert!(value.get("price").is_none());
    }

    #[test]
    fn test_cancel_bodies() {
        assert_eq!(
            serde_json::to_string(&CancelOrder { order_id: 131_513 }).unwrap(),
            r#"{"order_id":131513}"#
        );
        assert_eq!(
            serde_json::to_string(&CancelAllOrders::default()).unwrap(),
            "{}"
        );
    }
}

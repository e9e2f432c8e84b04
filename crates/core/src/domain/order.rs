use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Order state carried on every order-taking memory record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub step_number: String,
    #[serde(default)]
    pub order: Vec<OrderLine>,
    #[serde(default)]
    pub asked_recommendation_before: bool,
}

impl OrderSnapshot {
    pub fn total(&self) -> Decimal {
        self.order.iter().map(OrderLine::line_total).sum()
    }

    pub fn item_names(&self) -> Vec<String> {
        self.order.iter().map(|line| line.item.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{OrderLine, OrderSnapshot};

    #[test]
    fn total_multiplies_price_by_quantity() {
        let snapshot = OrderSnapshot {
            step_number: "3".to_string(),
            order: vec![
                OrderLine { item: "Latte".to_string(), quantity: 2, price: Decimal::new(475, 2) },
                OrderLine {
                    item: "Croissant".to_string(),
                    quantity: 1,
                    price: Decimal::new(325, 2),
                },
            ],
            asked_recommendation_before: false,
        };

        assert_eq!(snapshot.total(), Decimal::new(1275, 2));
        assert_eq!(snapshot.item_names(), vec!["Latte".to_string(), "Croissant".to_string()]);
    }

    #[test]
    fn price_is_read_from_json_number() {
        let line: OrderLine =
            serde_json::from_value(json!({"item": "Espresso Shot", "quantity": 1, "price": 2.0}))
                .expect("order line should parse");
        assert_eq!(line.price, Decimal::new(2, 0));
    }

    #[test]
    fn missing_recommendation_flag_defaults_to_false() {
        let snapshot: OrderSnapshot =
            serde_json::from_value(json!({"step_number": "1", "order": []}))
                .expect("snapshot should parse");
        assert!(!snapshot.asked_recommendation_before);
        assert!(snapshot.is_empty());
    }
}

//! Order type inference.
//!
//! The type of an order follows from where its target sits relative to the
//! market when the order is built:
//!
//! | side | target vs reference | type   |
//! |------|---------------------|--------|
//! | any  | equal               | market |
//! | buy  | below               | limit  |
//! | buy  | above               | stop   |
//! | sell | above               | limit  |
//! | sell | below               | stop   |

use std::cmp::Ordering;

use helm_core::{OrderSide, OrderType, Price};

use crate::error::{OrderError, OrderResult};

/// Classify an order from its side, target price and the reference price.
pub fn classify(side: OrderSide, target: Price, reference: Price) -> OrderResult<OrderType> {
    if !target.is_positive() {
        return Err(OrderError::Configuration(format!(
            "target price must be positive, got {target}"
        )));
    }
    if !reference.is_positive() {
        return Err(OrderError::Configuration(format!(
            "reference price must be positive, got {reference}"
        )));
    }

    let order_type = match (side, target.cmp(&reference)) {
        (_, Ordering::Equal) => OrderType::Market,
        (OrderSide::Buy, Ordering::Less) | (OrderSide::Sell, Ordering::Greater) => OrderType::Limit,
        (OrderSide::Buy, Ordering::Greater) | (OrderSide::Sell, Ordering::Less) => OrderType::Stop,
    };
    Ok(order_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn px(v: rust_decimal::Decimal) -> Price {
        Price::new(v)
    }

    #[test]
    fn test_equal_price_is_market_for_both_sides() {
        let r = px(dec!(100));
        assert_eq!(classify(OrderSide::Buy, r, r).unwrap(), OrderType::Market);
        assert_eq!(classify(OrderSide::Sell, r, r).unwrap(), OrderType::Market);
    }

    #[test]
    fn test_buy_side_rules() {
        let r = px(dec!(100));
        assert_eq!(
            classify(OrderSide::Buy, px(dec!(95)), r).unwrap(),
            OrderType::Limit
        );
        assert_eq!(
            classify(OrderSide::Buy, px(dec!(105)), r).unwrap(),
            OrderType::Stop
        );
    }

    #[test]
    fn test_sell_side_mirrors_buy_side() {
        let r = px(dec!(100));
        assert_eq!(
            classify(OrderSide::Sell, px(dec!(105)), r).unwrap(),
            OrderType::Limit
        );
        assert_eq!(
            classify(OrderSide::Sell, px(dec!(95)), r).unwrap(),
            OrderType::Stop
        );
    }

    #[test]
    fn test_rejects_non_positive_prices() {
        let r = px(dec!(100));
        assert!(matches!(
            classify(OrderSide::Buy, Price::ZERO, r),
            Err(OrderError::Configuration(_))
        ));
        assert!(matches!(
            classify(OrderSide::Sell, r, px(dec!(-1))),
            Err(OrderError::Configuration(_))
        ));
    }
}

use ibc_proto::cosmos::base::v1beta1::Coin;
use ibc_proto::cosmos::tx::v1beta1::Fee;
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::config::GasPrice;

/// Gas limit to sign with given the gas used by a simulation:
/// `ceil(gas_used * gas_adjustment)`, saturating at `u64::MAX`.
pub fn adjust_gas(gas_used: u64, gas_adjustment: f64) -> u64 {
    let adjusted = mul_ceil(gas_used, gas_adjustment);
    u64::try_from(&adjusted).unwrap_or(u64::MAX)
}

/// The fee paying for `gas_limit` at the first configured gas price. Without
/// any gas price the fee carries no amount.
pub fn gas_limit_to_fee(gas_limit: u64, gas_prices: &[GasPrice]) -> Fee {
    let amount = gas_prices
        .first()
        .map(|price| calculate_fee(gas_limit, price))
        .into_iter()
        .collect();

    Fee {
        amount,
        gas_limit,
        payer: String::new(),
        granter: String::new(),
    }
}

pub fn calculate_fee(gas_limit: u64, gas_price: &GasPrice) -> Coin {
    let fee_amount = mul_ceil(gas_limit, gas_price.price);

    Coin {
        denom: gas_price.denom.to_string(),
        amount: fee_amount.to_string(),
    }
}

/// Multiply `a` with `f` and round the result up to the nearest integer.
/// A non-finite `f` leaves `a` unchanged.
pub fn mul_ceil(a: u64, f: f64) -> BigInt {
    let a = BigInt::from(a);

    match BigRational::from_float(f) {
        Some(f) => (f * a).ceil().to_integer(),
        None => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn adjusted_gas_is_ceiled_product() {
        assert_eq!(adjust_gas(50_000, 1.5), 75_000);
        assert_eq!(adjust_gas(3, 1.1), 4);
        assert_eq!(adjust_gas(0, 1.5), 0);
        assert_eq!(adjust_gas(u64::MAX, 2.0), u64::MAX);
    }

    #[test]
    fn adjusted_gas_is_monotonic_in_adjustment() {
        let adjustments = [0.5, 1.0, 1.1, 1.25, 1.5, 2.0, 3.3];

        for gas_used in [1, 7, 999, 50_000, 1_234_567] {
            let limits = adjustments
                .iter()
                .map(|adjustment| adjust_gas(gas_used, *adjustment))
                .collect::<Vec<_>>();

            assert!(limits.windows(2).all(|w| w[0] <= w[1]), "{limits:?}");
        }
    }

    #[test]
    fn fee_from_first_gas_price() {
        let prices = vec![
            GasPrice::new(0.25, "uatom".to_string()),
            GasPrice::new(1.0, "stake".to_string()),
        ];

        let fee = gas_limit_to_fee(75_000, &prices);
        assert_eq!(fee.gas_limit, 75_000);
        assert_eq!(
            fee.amount,
            vec![Coin {
                denom: "uatom".to_string(),
                amount: "18750".to_string(),
            }]
        );

        let fee = gas_limit_to_fee(100_001, &prices[..1]);
        assert_eq!(fee.amount[0].amount, "25001");

        assert!(gas_limit_to_fee(75_000, &[]).amount.is_empty());
    }
}

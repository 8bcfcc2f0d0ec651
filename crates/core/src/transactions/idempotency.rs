//! Stable identity hashes for transactions.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Provider component used for user-entered records. The record id is appended
/// so two genuine identical manual entries never collide.
pub const MANUAL_PROVIDER: &str = "manual";

/// Deterministic SHA-256 fingerprint over
/// `provider|account_id|YYYY-MM-DD|amount|DESCRIPTION`.
///
/// The amount is normalized so `50000` and `50000.00` agree, and the
/// description is trimmed, whitespace-collapsed and uppercased so statement
/// re-exports with cosmetic differences hash identically.
pub fn fingerprint(
    provider: &str,
    account_id: &str,
    date: NaiveDate,
    amount: Decimal,
    raw_description: &str,
) -> String {
    let canonical = [
        provider.trim().to_ascii_lowercase(),
        account_id.trim().to_string(),
        date.format("%Y-%m-%d").to_string(),
        amount.abs().normalize().to_string(),
        canonical_description(raw_description),
    ]
    .join("|");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint for a user-entered record.
pub fn manual_fingerprint(
    record_id: &str,
    account_id: &str,
    date: NaiveDate,
    amount: Decimal,
    raw_description: &str,
) -> String {
    fingerprint(
        &format!("{}:{}", MANUAL_PROVIDER, record_id),
        account_id,
        date,
        amount,
        raw_description,
    )
}

fn canonical_description(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn march_2() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
    }

    #[test]
    fn fingerprint_is_fixed_length_hex() {
        let key = fingerprint("bancolombia", "acc-1", march_2(), dec!(50000), "NETFLIX.COM");
        assert_eq!(key.len(), 64);
        assert!(key.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_ignores_cosmetic_differences() {
        let a = fingerprint("bancolombia", "acc-1", march_2(), dec!(50000), "NETFLIX.COM");
        let b = fingerprint(" Bancolombia", "acc-1", march_2(), dec!(50000.00), "  netflix.com ");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_each_identity_field() {
        let base = fingerprint("bancolombia", "acc-1", march_2(), dec!(50000), "NETFLIX.COM");
        assert_ne!(
            base,
            fingerprint("nu", "acc-1", march_2(), dec!(50000), "NETFLIX.COM")
        );
        assert_ne!(
            base,
            fingerprint("bancolombia", "acc-2", march_2(), dec!(50000), "NETFLIX.COM")
        );
        assert_ne!(
            base,
            fingerprint(
                "bancolombia",
                "acc-1",
                NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
                dec!(50000),
                "NETFLIX.COM"
            )
        );
        assert_ne!(
            base,
            fingerprint("bancolombia", "acc-1", march_2(), dec!(50001), "NETFLIX.COM")
        );
    }

    #[test]
    fn manual_fingerprints_are_unique_per_record() {
        let a = manual_fingerprint("tx-1", "acc-1", march_2(), dec!(8000), "Coffee");
        let b = manual_fingerprint("tx-2", "acc-1", march_2(), dec!(8000), "Coffee");
        assert_ne!(a, b);
    }
}

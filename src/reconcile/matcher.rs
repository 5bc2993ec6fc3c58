use crate::adapters::abi::{CallArg, DecodedCall};
use crate::ledger::models::{Identifier, LedgerRecord};

/// Does this record reference the given bounty?
///
/// A record without a decoded candidate never matches.
pub fn matches(record: &LedgerRecord, identifier: &Identifier) -> bool {
    record
        .identifier_candidate
        .as_ref()
        .map_or(false, |candidate| candidate == identifier)
}

/// True when any string argument of the decoded call equals the identifier.
pub fn matches_call_args(call: &DecodedCall, identifier: &Identifier) -> bool {
    call.args.iter().any(|arg| match arg {
        CallArg::Str(value) => value == identifier.as_str(),
        CallArg::Address(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::abi::{Address, Selector};
    use crate::ledger::models::AssetKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_absent_candidate_never_matches() {
        let record = LedgerRecord::untagged("op-1", dec!(5), AssetKind::NativeCurrency);
        assert!(!matches(&record, &"issue/42".into()));
        assert!(!matches(&record, &"".into()));
    }

    #[test]
    fn test_url_variants_are_distinct() {
        let record = LedgerRecord::deposit(
            "op-3",
            "https://github.com/o/r/issues/42".into(),
            dec!(1),
            AssetKind::NativeCurrency,
        );
        assert!(matches(&record, &"https://github.com/o/r/issues/42".into()));
        assert!(!matches(&record, &"https://github.com/o/r/issues/4".into()));
        assert!(!matches(&record, &"https://github.com/o/r/issues/42/".into()));
        assert!(!matches(&record, &"https://github.com/o/r/issues/42SENT".into()));
    }

    #[test]
    fn test_record_match_uses_candidate() {
        let record = LedgerRecord::deposit(
            "op-2",
            "issue/42".into(),
            dec!(10),
            AssetKind::NativeCurrency,
        );
        assert!(matches(&record, &"issue/42".into()));
        assert!(!matches(&record, &"issue/4".into()));
    }

    #[test]
    fn test_call_args_ignore_addresses() {
        let call = DecodedCall {
            selector: Selector::new([0x06, 0x86, 0x8c, 0x4b]),
            args: vec![
                CallArg::Address(Address::with_last_byte(0xaa)),
                CallArg::Str("issue/9".into()),
            ],
        };
        assert!(matches_call_args(&call, &"issue/9".into()));
        assert!(!matches_call_args(
            &call,
            &"0x00000000000000000000000000000000000000aa".into()
        ));
    }
}

use crate::ledger::models::{AssetKind, Direction, Identifier, LedgerRecord};

/// Reserved suffix appended to an identifier in a payout memo.
pub const REDEMPTION_SUFFIX: &str = "SENT";

/// Memo written on the payout transaction for `identifier`.
pub fn marker_memo(identifier: &Identifier) -> String {
    format!("{}{}", identifier.as_str(), REDEMPTION_SUFFIX)
}

/// An identifier ending in the suffix cannot be told apart from another
/// bounty's marker, so it is never accepted for deposits or claims.
pub fn collides_with_marker(identifier: &Identifier) -> bool {
    identifier.as_str().ends_with(REDEMPTION_SUFFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoTag {
    Deposit(Identifier),
    Redemption(Identifier),
}

/// Classify a payment memo by the direction the payment moved.
///
/// Inbound payments are deposits tagged with the memo verbatim, even when the
/// memo happens to end in the suffix. Only outbound payments from custody can
/// be markers, and only when stripping the suffix leaves an identifier.
pub fn classify_memo(memo: Option<&str>, direction: Direction) -> Option<MemoTag> {
    let memo = memo.filter(|m| !m.is_empty())?;

    match direction {
        Direction::Inbound => Some(MemoTag::Deposit(Identifier::new(memo))),
        Direction::Outbound => memo
            .strip_suffix(REDEMPTION_SUFFIX)
            .filter(|id| !id.is_empty())
            .map(|id| MemoTag::Redemption(Identifier::new(id))),
    }
}

/// Any marker for `(identifier, asset)` redeems it, wherever it sits in the
/// sequence.
pub fn is_redeemed<'a, I>(records: I, identifier: &Identifier, asset: &AssetKind) -> bool
where
    I: IntoIterator<Item = &'a LedgerRecord>,
{
    records.into_iter().any(|record| {
        record.is_redemption_marker
            && &record.asset == asset
            && super::matcher::matches(record, identifier)
    })
}

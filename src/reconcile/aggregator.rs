use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::models::{AssetKind, BountyLedgerEntry, Identifier, LedgerRecord, RecordId, Truncation};
use futures::{Stream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use super::redemption::is_redeemed;

/// Which records a fold is allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationScope {
    pub identifier: Option<Identifier>,
    pub asset: Option<AssetKind>,
}

impl AggregationScope {
    /// Every tagged record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn bounty(identifier: Identifier, asset: Option<AssetKind>) -> Self {
        Self {
            identifier: Some(identifier),
            asset,
        }
    }

    pub fn admits(&self, record: &LedgerRecord) -> bool {
        let Some(candidate) = record.identifier_candidate.as_ref() else {
            return false;
        };

        if let Some(asset) = &self.asset {
            if &record.asset != asset {
                return false;
            }
        }

        match &self.identifier {
            Some(identifier) => super::matcher::matches(record, identifier),
            None => !candidate.as_str().is_empty(),
        }
    }
}

/// What a listing does with bounties that have been paid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedeemedPolicy {
    /// Keep them, with the deposited total reported as zero.
    #[default]
    Zero,
    /// Drop them from the result.
    Omit,
}

impl RedeemedPolicy {
    pub fn apply(self, mut entry: BountyLedgerEntry) -> Option<BountyLedgerEntry> {
        match (entry.redeemed, self) {
            (true, RedeemedPolicy::Omit) => None,
            (true, RedeemedPolicy::Zero) => {
                entry.total_deposited = Decimal::ZERO;
                Some(entry)
            }
            (false, _) => Some(entry),
        }
    }
}

/// Derived bounty state for one scan.
///
/// Built by folding records through [`BountyLedger::merge`]. Keyed by
/// `(identifier, asset)`, so the same identifier funded in two assets yields
/// two entries.
#[derive(Debug, Clone, Default)]
pub struct BountyLedger {
    entries: HashMap<(Identifier, AssetKind), BountyLedgerEntry>,
    seen: HashSet<RecordId>,
    truncation: Option<Truncation>,
}

impl BountyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record in.
    ///
    /// Records outside `scope` are ignored. A record id that was already
    /// merged is ignored, so replaying an overlapping page is harmless.
    /// Deposits keep accumulating after a marker is seen; the entry stays
    /// redeemed and [`BountyLedgerEntry::spendable`] stays zero.
    pub fn merge(mut self, record: &LedgerRecord, scope: &AggregationScope) -> Self {
        if !scope.admits(record) {
            return self;
        }
        let Some(identifier) = record.identifier_candidate.clone() else {
            return self;
        };
        if !self.seen.insert(record.id.clone()) {
            return self;
        }

        let asset = record.asset.clone();
        let entry = self
            .entries
            .entry((identifier.clone(), asset.clone()))
            .or_insert_with(|| BountyLedgerEntry::open(identifier, asset));

        if is_redeemed([record], &entry.identifier, &entry.asset) {
            entry.redeemed = true;
        } else {
            entry.total_deposited += record.amount;
            entry.deposit_count += 1;
        }

        self
    }

    /// Note that the records ended at a window cut.
    pub fn truncated(mut self, truncation: Truncation) -> Self {
        self.truncation.get_or_insert(truncation);
        self
    }

    /// Where the scan stopped short, if it did.
    pub fn truncation(&self) -> Option<&Truncation> {
        self.truncation.as_ref()
    }

    /// The ledger, provided it saw the whole history.
    pub fn complete(self) -> ReconcileResult<Self> {
        match self.truncation {
            Some(truncation) => Err(ReconcileError::HistoryTruncated(truncation)),
            None => Ok(self),
        }
    }

    pub fn entry(&self, identifier: &Identifier, asset: &AssetKind) -> Option<&BountyLedgerEntry> {
        self.entries.get(&(identifier.clone(), asset.clone()))
    }

    /// Entries as derived, redeemed ones included and untouched.
    pub fn iter(&self) -> impl Iterator<Item = &BountyLedgerEntry> {
        self.entries.values()
    }

    /// All entries for one identifier, across assets.
    pub fn entries_for(&self, identifier: &Identifier) -> Vec<&BountyLedgerEntry> {
        let mut found: Vec<_> = self
            .entries
            .values()
            .filter(|e| &e.identifier == identifier)
            .collect();
        found.sort_by(|a, b| a.asset.cmp(&b.asset));
        found
    }

    /// Entries ordered by identifier then asset.
    pub fn into_entries(self, policy: RedeemedPolicy) -> Vec<BountyLedgerEntry> {
        let mut entries: Vec<BountyLedgerEntry> = self
            .entries
            .into_values()
            .filter_map(|entry| policy.apply(entry))
            .collect();
        entries.sort_by(|a, b| {
            a.identifier
                .cmp(&b.identifier)
                .then_with(|| a.asset.cmp(&b.asset))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drain a record stream into a ledger.
///
/// A window cut marks the ledger truncated and the fold goes on (a listing
/// may chain several accounts). Any other stream error aborts the fold.
pub async fn fold_records<S>(records: S, scope: &AggregationScope) -> ReconcileResult<BountyLedger>
where
    S: Stream<Item = ReconcileResult<LedgerRecord>>,
{
    records
        .map(Ok::<_, ReconcileError>)
        .try_fold(BountyLedger::new(), |ledger, item| async move {
            match item {
                Ok(record) => Ok(ledger.merge(&record, scope)),
                Err(ReconcileError::HistoryTruncated(truncation)) => {
                    warn!("⚠️ Derived state is partial: {}", truncation);
                    Ok(ledger.truncated(truncation))
                }
                Err(e) => Err(e),
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::ledger::models::Chain;
    use futures::stream;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn native(id: &str, tag: &str, amount: Decimal) -> LedgerRecord {
        LedgerRecord::deposit(id, tag.into(), amount, AssetKind::NativeCurrency)
    }

    fn fold(records: &[LedgerRecord], scope: &AggregationScope) -> BountyLedger {
        records
            .iter()
            .fold(BountyLedger::new(), |ledger, r| ledger.merge(r, scope))
    }

    #[test]
    fn test_deposits_are_summed_per_identifier() {
        let records = vec![
            native("1", "issue/42", dec!(10)),
            native("2", "issue/42", dec!(5)),
            native("3", "issue/9", dec!(1.5)),
        ];
        let ledger = fold(&records, &AggregationScope::all());

        let entry = ledger.entry(&"issue/42".into(), &AssetKind::NativeCurrency).unwrap();
        assert_eq!(entry.total_deposited, dec!(15));
        assert_eq!(entry.deposit_count, 2);
        assert!(!entry.redeemed);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_merging_same_record_twice_does_not_double_count() {
        let record = native("1", "issue/42", dec!(10));
        let scope = AggregationScope::all();
        let ledger = BountyLedger::new()
            .merge(&record, &scope)
            .merge(&record, &scope);

        let entry = ledger.entry(&"issue/42".into(), &AssetKind::NativeCurrency).unwrap();
        assert_eq!(entry.total_deposited, dec!(10));
        assert_eq!(entry.deposit_count, 1);
    }

    #[test]
    fn test_interleaving_unrelated_identifiers_gives_same_totals() {
        let a = vec![
            native("a1", "issue/1", dec!(1)),
            native("a2", "issue/1", dec!(2)),
            LedgerRecord::redemption("a3", "issue/1".into(), dec!(3), AssetKind::NativeCurrency),
        ];
        let b = vec![native("b1", "issue/2", dec!(7)), native("b2", "issue/2", dec!(0.25))];

        let sequential: Vec<_> = a.iter().chain(b.iter()).cloned().collect();
        let interleaved = vec![
            b[0].clone(),
            a[0].clone(),
            a[1].clone(),
            b[1].clone(),
            a[2].clone(),
        ];

        let scope = AggregationScope::all();
        let left = fold(&sequential, &scope).into_entries(RedeemedPolicy::Zero);
        let right = fold(&interleaved, &scope).into_entries(RedeemedPolicy::Zero);
        assert_eq!(left, right);
    }

    #[test]
    fn test_marker_redeems_even_with_later_deposits() {
        let records = vec![
            native("1", "issue/7", dec!(20)),
            LedgerRecord::redemption("2", "issue/7".into(), dec!(20), AssetKind::NativeCurrency),
            native("3", "issue/7", dec!(4)),
        ];
        let ledger = fold(&records, &AggregationScope::all());
        let entry = ledger.entry(&"issue/7".into(), &AssetKind::NativeCurrency).unwrap();
        assert!(entry.redeemed);
        assert_eq!(entry.spendable(), Decimal::ZERO);
    }

    #[test]
    fn test_assets_are_separate_entries() {
        let records = vec![
            LedgerRecord::deposit("1", "issue/5".into(), dec!(10), AssetKind::issued("USDC", "GA")),
            LedgerRecord::deposit("2", "issue/5".into(), dec!(3), AssetKind::issued("EURC", "GA")),
        ];
        let ledger = fold(&records, &AggregationScope::all());
        let entries = ledger.entries_for(&"issue/5".into());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].total_deposited, dec!(3));
        assert_eq!(entries[1].total_deposited, dec!(10));
    }

    #[test]
    fn test_scope_filters_identifier_and_asset() {
        let records = vec![
            native("1", "issue/1", dec!(1)),
            native("2", "issue/2", dec!(2)),
            LedgerRecord::deposit("3", "issue/1".into(), dec!(4), AssetKind::issued("USDC", "GA")),
            LedgerRecord::untagged("4", dec!(100), AssetKind::NativeCurrency),
        ];
        let scope = AggregationScope::bounty("issue/1".into(), Some(AssetKind::NativeCurrency));
        let entries = fold(&records, &scope).into_entries(RedeemedPolicy::Zero);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_deposited, dec!(1));
    }

    #[test]
    fn test_policy_omits_or_zeroes_redeemed() {
        let records = vec![
            native("1", "issue/1", dec!(1)),
            native("2", "issue/2", dec!(2)),
            LedgerRecord::redemption("3", "issue/2".into(), dec!(2), AssetKind::NativeCurrency),
        ];
        let ledger = fold(&records, &AggregationScope::all());

        let omitted = ledger.clone().into_entries(RedeemedPolicy::Omit);
        assert_eq!(omitted.len(), 1);
        assert_eq!(omitted[0].identifier, "issue/1".into());

        let zeroed = ledger.into_entries(RedeemedPolicy::Zero);
        assert_eq!(zeroed.len(), 2);
        assert!(zeroed[1].redeemed);
        assert_eq!(zeroed[1].total_deposited, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_fold_records_stops_on_stream_error() {
        let items = vec![
            Ok(native("1", "issue/1", dec!(1))),
            Err(ReconcileError::unavailable(Chain::Stellar, "page 2 failed")),
            Ok(native("2", "issue/1", dec!(1))),
        ];
        let result = fold_records(stream::iter(items), &AggregationScope::all()).await;
        assert!(matches!(result, Err(ReconcileError::LedgerUnavailable { .. })));

        let items = vec![Ok(native("1", "issue/1", dec!(1))), Ok(native("2", "issue/1", dec!(2)))];
        let ledger = fold_records(stream::iter(items), &AggregationScope::all())
            .await
            .unwrap();
        assert_eq!(
            ledger
                .entry(&"issue/1".into(), &AssetKind::NativeCurrency)
                .unwrap()
                .total_deposited,
            dec!(3)
        );
    }

    #[tokio::test]
    async fn test_window_cut_marks_ledger_partial() {
        let cut = Truncation {
            chain: Chain::Ethereum,
            account: "0xb0a7e".into(),
            pages: 1,
        };
        let items = vec![
            Ok(native("1", "issue/1", dec!(1))),
            Err(ReconcileError::HistoryTruncated(cut.clone())),
            Ok(native("2", "issue/2", dec!(2))),
        ];
        let ledger = fold_records(stream::iter(items), &AggregationScope::all())
            .await
            .unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.truncation(), Some(&cut));
        assert!(matches!(
            ledger.complete(),
            Err(ReconcileError::HistoryTruncated(t)) if t == cut
        ));

        let items = vec![Ok(native("1", "issue/1", dec!(1)))];
        let whole = fold_records(stream::iter(items), &AggregationScope::all())
            .await
            .unwrap();
        assert!(whole.complete().is_ok());
    }
}

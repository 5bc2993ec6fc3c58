use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};
use crate::adapters::traits::{
    Broadcaster, ChainWriter, SignedTransaction, TransactionSigner, TransactionSpec,
};
use crate::error::SubmissionError;
use crate::ledger::models::Chain;

/// Pairs an injected signer with a chain's broadcast endpoint.
pub struct SigningWriter {
    chain: Chain,
    signer: Arc<dyn TransactionSigner>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl SigningWriter {
    pub fn new(
        chain: Chain,
        signer: Arc<dyn TransactionSigner>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            chain,
            signer,
            broadcaster,
        }
    }
}

#[async_trait]
impl ChainWriter for SigningWriter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn build_and_sign(&self, spec: &TransactionSpec) -> Result<SignedTransaction, SubmissionError> {
        let signed = self.signer.sign(spec).await?;

        if signed.chain != self.chain {
            return Err(SubmissionError::signing(
                self.chain,
                format!("signer produced a {} transaction", signed.chain),
            ));
        }

        info!("🔏 Signed {} transaction {}", self.chain, signed.hash);
        Ok(signed)
    }

    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, SubmissionError> {
        match self.broadcaster.broadcast(signed).await {
            Ok(tx_id) => {
                info!("📡 Broadcast {} transaction {}", self.chain, tx_id);
                Ok(tx_id)
            }
            Err(e) => {
                error!(
                    "❌ Broadcast of {} failed, it may still land: {}",
                    signed.hash, e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct WrongChainSigner;

    #[async_trait]
    impl TransactionSigner for WrongChainSigner {
        async fn sign(&self, _spec: &TransactionSpec) -> Result<SignedTransaction, SubmissionError> {
            Ok(SignedTransaction {
                chain: Chain::Ethereum,
                hash: "0xdead".into(),
                payload: "0x00".into(),
            })
        }
    }

    struct FailingBroadcaster;

    #[async_trait]
    impl Broadcaster for FailingBroadcaster {
        async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, SubmissionError> {
            Err(SubmissionError::broadcast(signed.chain, signed.hash.clone(), "timeout"))
        }
    }

    #[tokio::test]
    async fn test_rejects_signature_for_other_chain() {
        let writer = SigningWriter::new(
            Chain::Stellar,
            Arc::new(WrongChainSigner),
            Arc::new(FailingBroadcaster),
        );
        let spec = TransactionSpec::ContractCall {
            to: "0x01".into(),
            data: "0x".into(),
            value: dec!(0),
        };

        let err = writer.build_and_sign(&spec).await.unwrap_err();
        assert!(!err.may_have_landed());
        assert_eq!(err.chain, Chain::Stellar);
    }

    #[tokio::test]
    async fn test_broadcast_error_is_surfaced() {
        let writer = SigningWriter::new(
            Chain::Ethereum,
            Arc::new(WrongChainSigner),
            Arc::new(FailingBroadcaster),
        );
        let signed = SignedTransaction {
            chain: Chain::Ethereum,
            hash: "0xbeef".into(),
            payload: "0x01".into(),
        };

        let err = writer.broadcast(&signed).await.unwrap_err();
        assert!(err.may_have_landed());
        assert_eq!(err.signed_hash.as_deref(), Some("0xbeef"));
    }
}

//! VerifyCollateralUseCase: checks the claimed collateral against the
//! backend's address index.

use std::sync::Arc;

use mnode_core::CollateralProof;
use tracing::{debug, warn};

use super::backend::{BackendRpc, RpcError};

/// Outcome of a collateral lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollateralCheck {
    Verified(CollateralProof),
    /// The daemon cannot answer address queries; the operator may proceed
    /// unverified.
    IndexUnavailable(String),
}

pub struct CollateralVerifier {
    backend: Arc<dyn BackendRpc>,
}

impl CollateralVerifier {
    pub fn new(backend: Arc<dyn BackendRpc>) -> Self {
        Self { backend }
    }

    /// Looks up `address`'s unspent outputs and matches `txid:index`.
    ///
    /// # Errors
    ///
    /// Any RPC failure other than a missing address index.
    pub async fn verify(
        &self,
        address: &str,
        claimed_txid: &str,
        claimed_index: u32,
    ) -> Result<CollateralCheck, RpcError> {
        let utxos = match self.backend.get_address_utxos(address).await {
            Ok(utxos) => utxos,
            Err(RpcError::IndexUnavailable(reason)) => {
                warn!(%address, %reason, "collateral not verifiable");
                return Ok(CollateralCheck::IndexUnavailable(reason));
            }
            Err(e) => return Err(e),
        };
        let proof = CollateralProof::evaluate(&utxos, claimed_txid, claimed_index);
        debug!(
            %address,
            utxos = utxos.len(),
            matched = proof.matched,
            amount_ok = proof.amount_ok,
            "collateral checked"
        );
        Ok(CollateralCheck::Verified(proof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::MockBackendRpc;
    use mnode_core::{Utxo, REQUIRED_COLLATERAL_SATOSHIS};

    const TXID: &str = "1111111111111111111111111111111111111111111111111111111111111111";

    fn verifier_with(utxos: Result<Vec<Utxo>, RpcError>) -> CollateralVerifier {
        let mut backend = MockBackendRpc::new();
        backend
            .expect_get_address_utxos()
            .withf(|addr| addr.to_string() == "XcollateralAddr")
            .times(1)
            .return_const(utxos);
        CollateralVerifier::new(Arc::new(backend))
    }

    fn utxo(index: u32, satoshis: u64) -> Utxo {
        Utxo {
            txid: TXID.to_string(),
            output_index: index,
            satoshis,
        }
    }

    #[tokio::test]
    async fn test_exact_collateral_is_verified() {
        let verifier = verifier_with(Ok(vec![utxo(0, REQUIRED_COLLATERAL_SATOSHIS)]));

        let check = verifier.verify("XcollateralAddr", TXID, 0).await.unwrap();

        let CollateralCheck::Verified(proof) = check else {
            panic!("expected a proof");
        };
        assert!(proof.matched && proof.amount_ok);
    }

    #[tokio::test]
    async fn test_wrong_amount_is_matched_but_not_ok() {
        let verifier = verifier_with(Ok(vec![utxo(0, 5)]));

        let check = verifier.verify("XcollateralAddr", TXID, 0).await.unwrap();

        assert!(matches!(
            check,
            CollateralCheck::Verified(CollateralProof {
                matched: true,
                amount_ok: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unmatched_outpoint() {
        let verifier = verifier_with(Ok(vec![utxo(3, REQUIRED_COLLATERAL_SATOSHIS)]));

        let check = verifier.verify("XcollateralAddr", TXID, 0).await.unwrap();

        assert!(matches!(
            check,
            CollateralCheck::Verified(CollateralProof { matched: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_index_is_a_distinct_outcome() {
        let verifier = verifier_with(Err(RpcError::IndexUnavailable("no -addressindex".into())));

        let check = verifier.verify("XcollateralAddr", TXID, 0).await.unwrap();

        assert_eq!(
            check,
            CollateralCheck::IndexUnavailable("no -addressindex".to_string())
        );
    }

    #[tokio::test]
    async fn test_other_rpc_errors_propagate() {
        let verifier = verifier_with(Err(RpcError::Transport("refused".into())));
        assert!(verifier.verify("XcollateralAddr", TXID, 0).await.is_err());
    }
}

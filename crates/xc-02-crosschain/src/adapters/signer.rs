//! Signer that only logs what it would broadcast.
//!
//! Used by the replay runtime where no external chain is connected.

use crate::domain::OutboundInstruction;
use crate::ports::{OutboundSigner, SignerError};
use async_trait::async_trait;
use shared_types::Digest;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Logging signer with deterministic transaction hashes.
#[derive(Default)]
pub struct LoggingSigner {
    signed: AtomicU64,
}

impl LoggingSigner {
    /// Create a signer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions signed so far.
    pub fn signed(&self) -> u64 {
        self.signed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundSigner for LoggingSigner {
    async fn sign_and_broadcast(
        &self,
        instruction: &OutboundInstruction,
    ) -> Result<String, SignerError> {
        if instruction.tss_pubkey.is_empty() {
            return Err(SignerError::Rejected {
                message: "instruction has no signing key".to_string(),
            });
        }
        let tx_hash = Digest::of(
            "broadcast",
            &[
                &instruction.chain_id.to_be_bytes(),
                instruction.tss_pubkey.as_bytes(),
                &instruction.nonce.to_be_bytes(),
            ],
        );
        self.signed.fetch_add(1, Ordering::Relaxed);
        info!(
            chain_id = instruction.chain_id,
            nonce = instruction.nonce,
            receiver = %instruction.receiver,
            amount = instruction.amount,
            revert = instruction.is_revert,
            tx_hash = %tx_hash,
            "[xc-02] Signed outbound"
        );
        Ok(tx_hash.to_string())
    }
}

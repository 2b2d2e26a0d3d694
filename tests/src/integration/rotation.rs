//! # Key Rotation Tests
//!
//! Keygen → fund migration per chain → address update → new nonce sequence.

#[cfg(test)]
mod tests {
    use shared_types::BlockContext;
    use tokio_test::{assert_err, assert_ok};
    use xc_01_observer::{CrosschainFlags, KeygenObservation, KeygenStatus, ObserverError};
    use xc_02_crosschain::{CrossChainError, ReceiveStatus, XmsgKind, XmsgStatus};

    use crate::integration::fixtures::*;

    fn ctx(height: u64) -> BlockContext {
        BlockContext::new(height, 1_700_000_000 + height * 6)
    }

    fn keygen(pubkey: &str, keygen_height: u64) -> KeygenObservation {
        KeygenObservation {
            pubkey: pubkey.to_string(),
            keygen_height,
            status: KeygenStatus::Success,
        }
    }

    fn set_inbound(node: &TestNode, inbound_enabled: bool) {
        assert_ok!(node.observer.set_crosschain_flags(CrosschainFlags {
            inbound_enabled,
            outbound_enabled: true,
        }));
    }

    /// Park `pk2` as a generated key.
    fn generate_pk2(node: &TestNode, height: u64) {
        for i in 1..=3 {
            assert_ok!(node.observer.vote_keygen(&ctx(height), &relayer(i), keygen("pk2", height)));
        }
        // A later key group does not replace the current one by itself.
        assert_eq!(node.observer.get_current_tss(height).unwrap().pubkey, "pk1");
    }

    #[tokio::test]
    async fn test_full_rotation_starts_new_sequence() {
        let node = node();

        // One finished transfer under pk1 so the old sequence is non-empty.
        let xmsg = approve_inbound(&node, &ctx(5), transfer("0xold", true)).await;
        assert_eq!(xmsg.current_outbound().unwrap().nonce, 0);
        approve_outbound(&node, &ctx(6), mined(&xmsg, ReceiveStatus::Success)).await;

        generate_pk2(&node, 10);
        set_inbound(&node, false);

        let mut migrations = Vec::new();
        for (height, chain_id) in [(11, 101), (12, 1)] {
            let migration = assert_ok!(
                node.service
                    .migrate_tss_funds(&ctx(height), chain_id, "pk2", 1_000_000)
                    .await
            );
            assert_eq!(migration.kind, XmsgKind::TssMigration);
            assert_eq!(migration.status(), XmsgStatus::PendingOutbound);
            let attempt = migration.current_outbound().unwrap();
            assert_eq!(attempt.tss_pubkey, "pk1");
            assert_eq!(attempt.receiver, "pk2");
            migrations.push(migration);
        }
        assert_eq!(migrations[0].current_outbound().unwrap().nonce, 1);
        assert_eq!(migrations[1].current_outbound().unwrap().nonce, 0);

        // Not every chain is mined yet.
        let err = assert_err!(node.service.update_tss_address(&ctx(13), "pk2"));
        assert!(matches!(err, CrossChainError::TssUpdateBlocked { .. }));

        for migration in &migrations {
            let done = approve_outbound(&node, &ctx(14), mined(migration, ReceiveStatus::Success)).await;
            assert_eq!(done.status(), XmsgStatus::OutboundMined);
        }

        let tss = assert_ok!(node.service.update_tss_address(&ctx(15), "pk2"));
        assert_eq!(tss.pubkey, "pk2");
        assert_eq!(tss.finalized_height, 15);
        assert_eq!(node.observer.get_current_tss(15).unwrap().pubkey, "pk2");
        assert_eq!(node.observer.get_current_tss(14).unwrap().pubkey, "pk1");
        assert_eq!(node.observer.get_tss_history().unwrap().len(), 2);

        set_inbound(&node, true);
        let next = approve_inbound(&node, &ctx(16), transfer("0xnew", true)).await;
        let attempt = next.current_outbound().unwrap();
        assert_eq!((attempt.tss_pubkey.as_str(), attempt.nonce), ("pk2", 0));
    }

    #[tokio::test]
    async fn test_migration_preconditions() {
        let node = node();
        generate_pk2(&node, 10);

        // Inbound still enabled.
        let err = assert_err!(node.service.migrate_tss_funds(&ctx(11), 101, "pk2", 1).await);
        assert!(matches!(
            err,
            CrossChainError::Observer(ObserverError::MigrationBlocked { chain_id: 101, .. })
        ));

        // Outstanding nonce under the current key.
        approve_inbound(&node, &ctx(12), transfer("0xinflight", true)).await;
        set_inbound(&node, false);
        let err = assert_err!(node.service.migrate_tss_funds(&ctx(13), 101, "pk2", 1).await);
        assert!(matches!(
            err,
            CrossChainError::Observer(ObserverError::MigrationBlocked { .. })
        ));

        // Unknown key.
        let err = assert_err!(node.service.migrate_tss_funds(&ctx(13), 1, "pk9", 1).await);
        assert!(matches!(
            err,
            CrossChainError::Observer(ObserverError::MigrationBlocked { .. })
        ));

        // Chain 1 is drained, so its migration goes through.
        let migration = assert_ok!(node.service.migrate_tss_funds(&ctx(13), 1, "pk2", 1).await);
        assert_eq!(migration.current_outbound().unwrap().receiver_chain_id, 1);

        // Never generated keys cannot be promoted.
        let err = assert_err!(node.service.update_tss_address(&ctx(14), "pk9"));
        assert!(matches!(err, CrossChainError::TssUpdateBlocked { .. }));
    }
}

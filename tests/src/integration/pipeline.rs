//! # Xmsg Pipeline Tests
//!
//! Inbound ballot → Xmsg → nonce → signer → outbound ballot → terminal
//! status, through the real policy, signer and event channel.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use shared_types::{BlockContext, Digest};
    use tokio::time::timeout;
    use tokio_stream::StreamExt;
    use tokio_test::{assert_err, assert_ok};
    use xc_01_observer::{
        BallotStatus, BlockObservation, ChainParams, GasPriceObservation, ObserverError,
    };
    use xc_02_crosschain::{CrossChainError, ReceiveStatus, XmsgEvent, XmsgStatus};

    use crate::integration::fixtures::*;

    fn ctx(height: u64) -> BlockContext {
        BlockContext::new(height, 1_700_000_000 + height * 6)
    }

    #[tokio::test]
    async fn test_transfer_events_arrive_in_order() {
        let node = node();
        let mut events = node.publisher.event_stream();

        let xmsg = approve_inbound(&node, &ctx(5), transfer("0xaaa", true)).await;
        assert_eq!(xmsg.status(), XmsgStatus::PendingOutbound);
        let mined_xmsg = approve_outbound(&node, &ctx(6), mined(&xmsg, ReceiveStatus::Success)).await;
        assert_eq!(mined_xmsg.status(), XmsgStatus::OutboundMined);

        let mut kinds = Vec::new();
        for _ in 0..4 {
            let event = timeout(Duration::from_secs(1), events.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(event.index(), xmsg.index);
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds,
            vec![
                "xmsg_created",
                "status_changed",
                "outbound_dispatched",
                "status_changed"
            ]
        );
        assert_eq!(node.signer.signed(), 1);

        // The outbound attempt is finalized and its nonce is no longer outstanding.
        let attempt = mined_xmsg.outbound.last().unwrap();
        assert_eq!(attempt.tx_hash.as_deref(), Some("0xmined-101-0"));
        let pending = node.observer.get_pending_nonces_by_chain(101).unwrap();
        assert!(pending.iter().all(|p| p.outstanding.is_empty()));
    }

    #[tokio::test]
    async fn test_failed_transfer_is_returned_to_sender() {
        let node = node();
        let xmsg = approve_inbound(&node, &ctx(5), transfer("0xbbb", true)).await;

        let reverting = approve_outbound(&node, &ctx(6), mined(&xmsg, ReceiveStatus::Failed)).await;
        assert_eq!(reverting.status(), XmsgStatus::PendingRevert);
        assert_eq!(reverting.outbound.len(), 2);
        let revert = reverting.current_outbound().unwrap();
        assert_eq!(revert.receiver_chain_id, 1);
        assert_eq!(revert.receiver, "0xsender");
        assert_eq!(revert.nonce, 0);
        assert!(revert.is_revert);

        let reverted =
            approve_outbound(&node, &ctx(7), mined(&reverting, ReceiveStatus::Success)).await;
        assert_eq!(reverted.status(), XmsgStatus::Reverted);
        assert_eq!(node.signer.signed(), 2);

        // Late outbound votes never reach a terminal Xmsg.
        let late = node
            .service
            .vote_outbound(&ctx(8), &relayer(5), mined(&reverting, ReceiveStatus::Success))
            .await;
        assert!(matches!(late, Err(CrossChainError::InvalidTransition { .. })));
        let unchanged = node.service.get_xmsg_by_index(&xmsg.index).unwrap().unwrap();
        assert_eq!(unchanged, reverted);
    }

    #[tokio::test]
    async fn test_failure_without_revert_options_aborts() {
        let node = node();
        let xmsg = approve_inbound(&node, &ctx(5), transfer("0xccc", false)).await;

        let aborted = approve_outbound(&node, &ctx(6), mined(&xmsg, ReceiveStatus::Failed)).await;
        assert_eq!(aborted.status(), XmsgStatus::Aborted);
        assert_eq!(aborted.outbound.len(), 1);
        assert!(node.service.list_pending_xmsgs(None).unwrap().is_empty());
        assert!(node.observer.get_pending_nonces_by_chain(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revert_short_of_fee_aborts() {
        let node = node();
        let xmsg = approve_inbound(
            &node,
            &ctx(5),
            xc_02_crosschain::InboundObservation {
                amount: 1,
                ..transfer("0xc1c", true)
            },
        )
        .await;
        assert_eq!(xmsg.status(), XmsgStatus::PendingOutbound);

        let aborted = approve_outbound(&node, &ctx(6), mined(&xmsg, ReceiveStatus::Failed)).await;
        assert_eq!(aborted.status(), XmsgStatus::Aborted);
        assert!(aborted.status.message.contains("insufficient funds"));
        assert_eq!(aborted.outbound.len(), 1);
        assert!(node.observer.get_pending_nonces_by_chain(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gas_price_median_prices_attempts_and_refund() {
        let node = node();
        for (i, price) in [(1, 4), (2, 2), (3, 8)] {
            for chain_id in [1, 101] {
                assert_ok!(node.observer.vote_gas_price(
                    &ctx(4),
                    &relayer(i),
                    GasPriceObservation {
                        chain_id,
                        price,
                        external_height: 300,
                    },
                ));
            }
        }

        let xmsg = approve_inbound(&node, &ctx(5), transfer("0xc2c", true)).await;
        assert_eq!(xmsg.current_outbound().unwrap().gas_price, 4);

        let reverting = approve_outbound(&node, &ctx(6), mined(&xmsg, ReceiveStatus::Failed)).await;
        let revert = reverting.current_outbound().unwrap();
        assert_eq!(revert.gas_price, 4);
        assert_eq!(revert.amount, 2_500_000 - 250_000 * 4);

        // A price above what the amount can cover rules the next revert out.
        for i in 1..=3 {
            assert_ok!(node.observer.vote_gas_price(
                &ctx(7),
                &relayer(i),
                GasPriceObservation {
                    chain_id: 1,
                    price: 100,
                    external_height: 301,
                },
            ));
        }
        let pricey = approve_inbound(&node, &ctx(8), transfer("0xc3c", true)).await;
        let aborted = approve_outbound(&node, &ctx(9), mined(&pricey, ReceiveStatus::Failed)).await;
        assert_eq!(aborted.status(), XmsgStatus::Aborted);
    }

    #[tokio::test]
    async fn test_late_inbound_vote_is_kept_for_audit() {
        let node = node();
        let observation = transfer("0xddd", true);
        approve_inbound(&node, &ctx(5), observation.clone()).await;

        let err = assert_err!(
            node.service
                .vote_inbound(&ctx(6), &relayer(5), observation.clone())
                .await
        );
        assert!(matches!(
            err,
            CrossChainError::Observer(ObserverError::BallotAlreadyFinalized {
                decision: BallotStatus::Approved(_),
                ..
            })
        ));

        let ballot = node
            .observer
            .get_ballot_by_index(&observation.ballot_index())
            .unwrap()
            .unwrap();
        assert_eq!(ballot.votes.len(), 4);
        assert_eq!(ballot.late_votes.len(), 1);
        assert_eq!(ballot.late_votes[0].voter, relayer(5));
        assert_eq!(ballot.finalized_at, Some(5));
        // Exactly one Xmsg for the event.
        assert_eq!(
            node.service.get_xmsg_by_inbound(1, "0xddd").unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_inbound_waits_for_confirmations() {
        let node = node_with(
            vec![ChainParams::supported(1, 6), ChainParams::supported(101, 0)],
            20,
        );
        let xmsg = approve_inbound(&node, &ctx(5), transfer("0xeee", true)).await;
        assert_eq!(xmsg.status(), XmsgStatus::PendingInbound);

        let header = |height: u64| BlockObservation {
            chain_id: 1,
            height,
            hash: Digest::of("block", &[&height.to_be_bytes()]),
        };
        for i in 1..=4 {
            assert_ok!(node.observer.vote_block_header(&ctx(6), &relayer(i), header(103)));
        }
        let report = assert_ok!(node.service.on_block(&ctx(7)).await);
        assert_eq!((report.pending, report.scheduled), (1, 0));

        for i in 1..=4 {
            assert_ok!(node.observer.vote_block_header(&ctx(8), &relayer(i), header(105)));
        }
        assert_eq!(node.observer.get_chain_state(1).unwrap().unwrap().latest_height, 105);
        let report = assert_ok!(node.service.on_block(&ctx(9)).await);
        assert_eq!(report.scheduled, 1);

        let xmsg = node.service.get_xmsg_by_index(&xmsg.index).unwrap().unwrap();
        assert_eq!(xmsg.status(), XmsgStatus::PendingOutbound);
        assert_eq!(xmsg.current_outbound().unwrap().created_at, 9);
    }

    #[tokio::test]
    async fn test_timeouts_revert_then_abort() {
        let node = node();
        let xmsg = approve_inbound(&node, &ctx(5), transfer("0xfff", true)).await;

        let report = assert_ok!(node.service.on_block(&ctx(24)).await);
        assert_eq!(report.timed_out, 0);

        let report = assert_ok!(node.service.on_block(&ctx(25)).await);
        assert_eq!(report.timed_out, 1);
        let reverting = node.service.get_xmsg_by_index(&xmsg.index).unwrap().unwrap();
        assert_eq!(reverting.status(), XmsgStatus::PendingRevert);
        assert_eq!(reverting.current_outbound().unwrap().created_at, 25);

        let report = assert_ok!(node.service.on_block(&ctx(45)).await);
        assert_eq!((report.timed_out, report.aborted), (1, 1));
        let aborted = node.service.get_xmsg_by_index(&xmsg.index).unwrap().unwrap();
        assert_eq!(aborted.status(), XmsgStatus::Aborted);

        // A vote for the timed-out attempt no longer matches anything.
        let stale = node
            .service
            .vote_outbound(&ctx(46), &relayer(1), mined(&reverting, ReceiveStatus::Success))
            .await;
        assert!(matches!(stale, Err(CrossChainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_weighted_votes_use_the_creation_snapshot() {
        let node = node();
        let weights: BTreeMap<String, u64> = [(relayer(1), 5)]
            .into_iter()
            .chain((2..=5).map(|i| (relayer(i), 1)))
            .collect();
        assert_ok!(node.observer.update_relayer_set(&ctx(10), weights.clone()));

        let observation = transfer("0x999", true);
        let first = assert_ok!(
            node.service
                .vote_inbound(&ctx(10), &relayer(1), observation.clone())
                .await
        );
        assert!(first.ballot.is_new);

        // relayer-2 leaves the set after the ballot was created.
        let mut without_two = weights.clone();
        without_two.remove(&relayer(2));
        assert_ok!(node.observer.update_relayer_set(&ctx(11), without_two));
        let refused = node
            .service
            .vote_inbound(&ctx(11), &relayer(2), observation.clone())
            .await;
        assert!(matches!(
            refused,
            Err(CrossChainError::Observer(ObserverError::UnauthorizedVoter { .. }))
        ));

        // 6 of 9 is exactly two thirds: not enough.
        let second = assert_ok!(
            node.service
                .vote_inbound(&ctx(11), &relayer(3), observation.clone())
                .await
        );
        assert_eq!(second.ballot.status, BallotStatus::InProgress);

        let third = assert_ok!(
            node.service
                .vote_inbound(&ctx(11), &relayer(4), observation.clone())
                .await
        );
        assert!(third.ballot.approved_now());
        assert_eq!(third.xmsg.unwrap().status(), XmsgStatus::PendingOutbound);
    }
}

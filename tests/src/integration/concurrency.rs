//! # Concurrency Tests
//!
//! Nonce allocation and ballot finalization under parallel callers.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;

    use rand::seq::SliceRandom;
    use rand::Rng;
    use shared_types::{BlockContext, Digest};
    use tokio_test::assert_ok;
    use xc_02_crosschain::XmsgStatus;

    use crate::integration::fixtures::*;

    const PAIRS: [(u64, &str); 3] = [(101, "pk1"), (101, "pk2"), (7, "pk1")];

    #[test]
    fn test_parallel_allocations_are_contiguous_per_pair() {
        let node = node();
        let observer = Arc::clone(&node.observer);

        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let observer = Arc::clone(&observer);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut taken = Vec::new();
                    for i in 0..50u64 {
                        let (chain_id, pubkey) = *PAIRS.choose(&mut rng).unwrap();
                        let index = Digest::of("alloc", &[&worker.to_be_bytes(), &i.to_be_bytes()]);
                        let mut tx = observer.begin();
                        let nonce = observer.nonces.allocate(&mut tx, chain_id, pubkey, index).unwrap();
                        // Hold the pair a little while before committing.
                        if rng.gen_bool(0.2) {
                            thread::yield_now();
                        }
                        tx.commit().unwrap();
                        taken.push((chain_id, pubkey, nonce));
                    }
                    taken
                })
            })
            .collect();

        let all: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(all.len(), 400);

        let tx = observer.begin();
        for (chain_id, pubkey) in PAIRS {
            let nonces: BTreeSet<u64> = all
                .iter()
                .filter(|(c, p, _)| *c == chain_id && *p == pubkey)
                .map(|(_, _, n)| *n)
                .collect();
            let count = all
                .iter()
                .filter(|(c, p, _)| *c == chain_id && *p == pubkey)
                .count() as u64;
            assert_eq!(nonces.len() as u64, count, "duplicate nonce on {chain_id}/{pubkey}");
            assert_eq!(nonces, (0..count).collect::<BTreeSet<_>>());

            let counter = observer
                .nonces
                .chain_nonces(&tx, chain_id, pubkey)
                .unwrap()
                .map_or(0, |c| c.next_nonce);
            assert_eq!(counter, count);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_inbound_approvals_share_one_sequence() {
        const TRANSFERS: usize = 24;
        let node = Arc::new(node());
        let ctx = BlockContext::new(5, 1_700_000_030);

        let tasks: Vec<_> = (0..TRANSFERS)
            .map(|i| {
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    let observation = transfer(&format!("0x{:04x}", i), true);
                    let mut order: Vec<usize> = (1..=RELAYERS).collect();
                    order.shuffle(&mut rand::thread_rng());
                    let mut approved = None;
                    for voter in order.into_iter().take(4) {
                        let result = node
                            .service
                            .vote_inbound(&ctx, &relayer(voter), observation.clone())
                            .await
                            .unwrap();
                        if let Some(xmsg) = result.xmsg {
                            approved = Some(xmsg);
                        }
                    }
                    approved.unwrap()
                })
            })
            .collect();

        let mut nonces = BTreeSet::new();
        for task in tasks {
            let xmsg = task.await.unwrap();
            assert_eq!(xmsg.status(), XmsgStatus::PendingOutbound);
            let attempt = xmsg.current_outbound().unwrap();
            assert_eq!((attempt.receiver_chain_id, attempt.tss_pubkey.as_str()), (101, "pk1"));
            assert!(nonces.insert(attempt.nonce), "nonce {} reused", attempt.nonce);
        }
        assert_eq!(nonces, (0..TRANSFERS as u64).collect::<BTreeSet<_>>());

        let pending = assert_ok!(node.observer.get_pending_nonces_by_chain(101));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].nonce_low, 0);
        assert_eq!(pending[0].nonce_high, TRANSFERS as u64);
        assert_eq!(pending[0].outstanding.len(), TRANSFERS);
        assert_eq!(node.signer.signed(), TRANSFERS as u64);
    }
}

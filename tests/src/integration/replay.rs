//! # Replay Tests
//!
//! Event log on disk → parser → container built from the default config →
//! replayer summary.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use node_runtime::replay::read_event_log;
    use node_runtime::{EventReplayer, LogEntry, LogEvent, NodeConfig, SubsystemContainer};
    use tokio_test::assert_ok;
    use xc_02_crosschain::{ReceiveStatus, XmsgStatus};

    use crate::integration::fixtures::*;

    fn inbound_vote(height: u64, voter: &str) -> String {
        format!(
            r#"{{"height": {height}, "timestamp": {ts}, "event": {{"vote_inbound": {{"voter": "{voter}", "observation": {{"sender_chain_id": 1, "sender": "0xsender", "tx_origin": "0xsender", "receiver_chain_id": 101, "receiver": "0xreceiver", "amount": 7000, "tx_hash": "0xreplay", "tx_height": 90, "revert_options": {{}}}}}}}}}}"#,
            height = height,
            ts = height * 6,
            voter = voter,
        )
    }

    fn write_log(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# devnet replay").unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
            writeln!(file).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_replay_from_file_then_outbound() {
        let mut lines: Vec<String> = (1..=4).map(|i| inbound_vote(3, &relayer(i))).collect();
        lines.push(inbound_vote(3, "stranger"));
        lines.push(r#"{"height": 2, "timestamp": 12, "event": "tick"}"#.to_string());
        let file = write_log(&lines);

        let entries = assert_ok!(read_event_log(file.path()));
        assert_eq!(entries.len(), 6);

        let container = Arc::new(assert_ok!(SubsystemContainer::new(NodeConfig::default())));
        let mut replayer = EventReplayer::new(Arc::clone(&container));
        let summary = replayer.run(entries).await;

        assert_eq!(summary.entries, 6);
        assert_eq!(summary.applied, 4);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.halted, None);
        assert_eq!(summary.last_height, Some(3));
        assert_eq!(summary.blocks, 1);
        assert_eq!(summary.ballots_approved, 1);
        assert_eq!(summary.lifecycle.created, 1);
        assert_eq!(summary.lifecycle.dispatched, 1);
        assert_eq!(summary.pending_xmsgs, 1);
        assert_eq!(summary.current_tss.as_deref(), Some("tss-genesis"));
        assert_eq!(summary.signed, 1);

        // The log producer learns the Xmsg index from the node and reports the
        // mined outbound.
        let xmsgs = assert_ok!(container.crosschain.get_xmsg_by_inbound(1, "0xreplay"));
        assert_eq!(xmsgs.len(), 1);
        let observation = mined(&xmsgs[0], ReceiveStatus::Success);
        for i in 1..=4 {
            let entry = LogEntry {
                height: 4,
                timestamp: 24,
                event: LogEvent::VoteOutbound {
                    voter: relayer(i),
                    observation: observation.clone(),
                },
            };
            assert_eq!(replayer.apply(&entry).await, node_runtime::replay::EntryOutcome::Applied);
        }

        let summary = replayer.summary();
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.ballots_approved, 2);
        assert_eq!(summary.pending_xmsgs, 0);
        assert_eq!(summary.lifecycle.transitions.get("outbound_mined"), Some(&1));
        let xmsg = assert_ok!(container.crosschain.get_xmsg_by_index(&xmsgs[0].index)).unwrap();
        assert_eq!(xmsg.status(), XmsgStatus::OutboundMined);
    }

    #[tokio::test]
    async fn test_malformed_line_reports_its_number() {
        let file = write_log(&[
            inbound_vote(1, &relayer(1)),
            r#"{"height": 2, "event": "tick""#.to_string(),
        ]);
        let err = read_event_log(file.path()).unwrap_err();
        assert!(matches!(
            err,
            node_runtime::replay::ReplayError::Parse { line, .. } if line > 1
        ));
    }
}

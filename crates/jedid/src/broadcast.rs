//! Broadcast engine.
//!
//! Every broadcast pass runs under one async "lane" mutex, so passes are
//! linearized: if the engine sees B1 before B2, every recipient that stays
//! connected receives B1 before B2. Within a pass the writes to different
//! sessions run concurrently against a roster snapshot.
//!
//! Sessions whose write fails are collected during the pass and removed by
//! id afterwards, never while iterating.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use jedi_core::SessionId;

use crate::display::ChatDisplay;
use crate::roster::Roster;

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that received the line.
    pub delivered: usize,

    /// Sessions whose write failed; they have been removed.
    pub dropped: Vec<SessionId>,
}

/// Fans text out to the roster and keeps the display informed.
pub struct Broadcaster {
    roster: Roster,
    display: Arc<dyn ChatDisplay>,
    lane: tokio::sync::Mutex<()>,
    write_timeout: Duration,
}

impl Broadcaster {
    pub fn new(roster: Roster, display: Arc<dyn ChatDisplay>, write_timeout: Duration) -> Self {
        Self {
            roster,
            display,
            lane: tokio::sync::Mutex::new(()),
            write_timeout,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Delivers `text` to every Active session.
    ///
    /// The text is also handed to the display. Sessions that fail the write
    /// are removed from the roster and told to close; their readers then
    /// broadcast the departure notice.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let report = {
            let _lane = self.lane.lock().await;
            self.display.on_message(text);

            let recipients = self.roster.snapshot();
            let results = join_all(
                recipients
                    .iter()
                    .map(|session| session.send_text(text, self.write_timeout)),
            )
            .await;

            let mut report = BroadcastReport::default();
            for (session, result) in recipients.iter().zip(results) {
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        debug!(
                            session_id = %session.id(),
                            error = %e,
                            "Failed to deliver broadcast"
                        );
                        report.dropped.push(session.id());
                    }
                }
            }
            report
        };

        if !report.dropped.is_empty() {
            let mut removed = 0usize;
            for id in &report.dropped {
                if let Some(session) = self.roster.remove_by_id(*id) {
                    warn!(session_id = %id, name = %session.name(), "Dropping unreachable session");
                    session.request_close();
                    removed += 1;
                }
            }
            if removed > 0 {
                self.publish_roster();
            }
        }

        report
    }

    /// Pushes the current roster to the display.
    pub fn publish_roster(&self) {
        let names = self.roster.names();
        let count = names.len();
        self.display.on_roster_changed(&names, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::pipe_session;
    use futures::StreamExt;
    use jedi_core::SessionState;
    use jedi_protocol::FrameCodec;
    use parking_lot::Mutex;
    use tokio_util::codec::FramedRead;

    #[derive(Default)]
    struct RecordingDisplay {
        messages: Mutex<Vec<String>>,
        rosters: Mutex<Vec<(Vec<String>, usize)>>,
    }

    impl ChatDisplay for RecordingDisplay {
        fn on_message(&self, text: &str) {
            self.messages.lock().push(text.to_string());
        }

        fn on_roster_changed(&self, names: &[String], count: usize) {
            self.rosters.lock().push((names.to_vec(), count));
        }
    }

    fn engine(roster: &Roster) -> (Broadcaster, Arc<RecordingDisplay>) {
        let display = Arc::new(RecordingDisplay::default());
        let broadcaster = Broadcaster::new(
            roster.clone(),
            Arc::clone(&display) as Arc<dyn ChatDisplay>,
            Duration::from_secs(1),
        );
        (broadcaster, display)
    }

    #[tokio::test]
    async fn test_delivers_to_every_member_in_order() {
        let roster = Roster::new();
        let (broadcaster, display) = engine(&roster);

        let mut peers = Vec::new();
        for (id, name) in [(1, "Obi"), (2, "Ani"), (3, "Yoda")] {
            let (session, peer) = pipe_session(id, name);
            roster.add(session).unwrap();
            peers.push(FramedRead::new(peer, FrameCodec::new()));
        }

        let first = broadcaster.broadcast("B1").await;
        let second = broadcaster.broadcast("B2").await;
        assert_eq!(first.delivered, 3);
        assert_eq!(second.delivered, 3);

        for peer in &mut peers {
            let a = peer.next().await.unwrap().unwrap();
            let b = peer.next().await.unwrap().unwrap();
            assert_eq!(a.as_text(), Some("B1"));
            assert_eq!(b.as_text(), Some("B2"));
        }

        assert_eq!(*display.messages.lock(), vec!["B1", "B2"]);
    }

    #[tokio::test]
    async fn test_failed_session_removed_after_pass() {
        let roster = Roster::new();
        let (broadcaster, display) = engine(&roster);

        let (obi, obi_peer) = pipe_session(1, "Obi");
        let (ani, ani_peer) = pipe_session(2, "Ani");
        roster.add(Arc::clone(&obi)).unwrap();
        roster.add(Arc::clone(&ani)).unwrap();

        // Obi's client vanished.
        drop(obi_peer);

        let report = broadcaster.broadcast("Ani: anyone?").await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![SessionId::new(1)]);

        assert_eq!(roster.names(), vec!["Ani"]);
        assert_eq!(obi.state(), SessionState::Closing);
        assert!(obi.is_close_requested());
        assert_eq!(
            display.rosters.lock().last().cloned(),
            Some((vec!["Ani".to_string()], 1))
        );

        // The next broadcast only goes to Ani.
        let report = broadcaster.broadcast("Ani: hello?").await;
        assert_eq!(report.delivered, 1);
        assert!(report.dropped.is_empty());

        let mut ani_frames = FramedRead::new(ani_peer, FrameCodec::new());
        assert_eq!(
            ani_frames.next().await.unwrap().unwrap().as_text(),
            Some("Ani: anyone?")
        );
        assert_eq!(
            ani_frames.next().await.unwrap().unwrap().as_text(),
            Some("Ani: hello?")
        );
        drop(ani);
    }

    #[tokio::test]
    async fn test_empty_roster_still_notifies_display() {
        let roster = Roster::new();
        let (broadcaster, display) = engine(&roster);

        let report = broadcaster.broadcast("nobody here").await;
        assert_eq!(report, BroadcastReport::default());
        assert_eq!(*display.messages.lock(), vec!["nobody here"]);
    }

    #[tokio::test]
    async fn test_concurrent_broadcasts_share_one_order() {
        let roster = Roster::new();
        let (broadcaster, _display) = engine(&roster);
        let broadcaster = Arc::new(broadcaster);

        let (s1, p1) = pipe_session(1, "Obi");
        let (s2, p2) = pipe_session(2, "Ani");
        roster.add(s1).unwrap();
        roster.add(s2).unwrap();

        let mut tasks = Vec::new();
        for n in 0..20 {
            let broadcaster = Arc::clone(&broadcaster);
            tasks.push(tokio::spawn(async move {
                broadcaster.broadcast(&format!("line {n}")).await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut r1 = FramedRead::new(p1, FrameCodec::new());
        let mut r2 = FramedRead::new(p2, FrameCodec::new());
        for _ in 0..20 {
            let a = r1.next().await.unwrap().unwrap();
            let b = r2.next().await.unwrap().unwrap();
            assert_eq!(a, b);
        }
    }
}

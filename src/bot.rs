//! Inbound chat handling: text -> [`BotCommand`] -> orchestrator call -> reply.
//! The listener holds no state of its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::collaborators::{ChatTransport, InboundMessage};
use crate::confirmation::{RequestId, Verdict};
use crate::messages;
use crate::orchestrator::{ControlState, Orchestrator};
use crate::state_machine::AttemptId;
use crate::subscribers::ChatId;

/// Pause after a failed `getUpdates` before polling again.
const TRANSPORT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    /// `/stop` and `/pause`.
    Pause,
    Resume,
    Status,
    Stats,
    GetCv,
    Subscribe,
    Unsubscribe,
    Offer {
        id: Option<AttemptId>,
        note: String,
    },
    Reply {
        verdict: Verdict,
        id: Option<RequestId>,
    },
    Thanks,
    FindJobs,
    Help,
}

impl BotCommand {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let mut words = text.split_whitespace();
        let Some(first) = words.next() else {
            return BotCommand::Help;
        };

        if let Some(command) = first.strip_prefix('/') {
            // "/status@jobpilot_bot" in group chats.
            let name = command
                .split('@')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();
            return match name.as_str() {
                "start" => BotCommand::Start,
                "stop" | "pause" => BotCommand::Pause,
                "resume" => BotCommand::Resume,
                "status" => BotCommand::Status,
                "stats" => BotCommand::Stats,
                "get_cv" => BotCommand::GetCv,
                "subscribe" => BotCommand::Subscribe,
                "unsubscribe" => BotCommand::Unsubscribe,
                "offer" => BotCommand::Offer {
                    id: words.next().map(|id| AttemptId(id.to_string())),
                    note: words.collect::<Vec<_>>().join(" "),
                },
                "approve" | "yes" => BotCommand::Reply {
                    verdict: Verdict::Approve,
                    id: words.next().and_then(request_id),
                },
                "decline" | "no" | "skip" => BotCommand::Reply {
                    verdict: Verdict::Decline,
                    id: words.next().and_then(request_id),
                },
                _ => BotCommand::Help,
            };
        }

        if let Some(verdict) = Verdict::recognize(first) {
            return BotCommand::Reply {
                verdict,
                id: words.next().and_then(request_id),
            };
        }

        let lower = text.to_lowercase();
        if lower.contains("thank") {
            BotCommand::Thanks
        } else if lower.contains("job") && lower.contains("find") {
            BotCommand::FindJobs
        } else {
            BotCommand::Help
        }
    }

    /// Commands any chat may send, subscribed or not.
    fn is_public(&self) -> bool {
        matches!(
            self,
            BotCommand::Subscribe | BotCommand::Help | BotCommand::Thanks | BotCommand::FindJobs
        )
    }
}

fn request_id(word: &str) -> Option<RequestId> {
    word.trim_start_matches('#').parse().ok().map(RequestId)
}

/// Apply `command` on behalf of `chat` and return the reply text.
pub async fn dispatch(orch: &Orchestrator, chat: ChatId, command: BotCommand) -> String {
    if !command.is_public() && !orch.is_subscribed(chat) {
        debug!(%chat, ?command, "command from unsubscribed chat refused");
        return messages::NOT_SUBSCRIBED.into();
    }

    match command {
        BotCommand::Start => {
            if orch.start() {
                messages::WELCOME.into()
            } else {
                running_or_stopped(orch)
            }
        }
        BotCommand::Pause => {
            if orch.control_state() == ControlState::Stopped {
                messages::STOPPED.into()
            } else {
                orch.pause();
                messages::PAUSED.into()
            }
        }
        BotCommand::Resume => {
            if orch.resume() {
                messages::RESUMED.into()
            } else {
                running_or_stopped(orch)
            }
        }
        BotCommand::Status => messages::status(&orch.status().await),
        BotCommand::Stats => match orch.stats().await {
            Ok(stats) => messages::stats(&stats),
            Err(err) => {
                warn!(error = %err, "statistics unavailable");
                format!("Couldn't read statistics: {err}")
            }
        },
        BotCommand::GetCv => {
            let cv = orch.base_cv();
            if cv.trim().is_empty() {
                messages::NO_CV.into()
            } else {
                messages::base_cv(cv)
            }
        }
        BotCommand::Subscribe => {
            if orch.subscribe(chat) {
                info!(%chat, "chat subscribed");
                messages::SUBSCRIBED.into()
            } else {
                messages::ALREADY_SUBSCRIBED.into()
            }
        }
        BotCommand::Unsubscribe => {
            if orch.unsubscribe(chat) {
                info!(%chat, "chat unsubscribed");
                messages::UNSUBSCRIBED.into()
            } else {
                messages::NOT_SUBSCRIBED.into()
            }
        }
        BotCommand::Offer { id: None, .. } => messages::OFFER_USAGE.into(),
        BotCommand::Offer { id: Some(id), note } => match orch.report_offer(&id, &note).await {
            Ok(record) => messages::offer_recorded(&record),
            Err(err) => format!("Offer rejected: {err}"),
        },
        BotCommand::Reply { verdict, id } => messages::reply_outcome(&orch.reply(id, verdict)),
        BotCommand::Thanks => messages::THANKS.into(),
        BotCommand::FindJobs => messages::SEARCHING.into(),
        BotCommand::Help => messages::HELP.into(),
    }
}

fn running_or_stopped(orch: &Orchestrator) -> String {
    match orch.control_state() {
        ControlState::Stopped => messages::STOPPED.into(),
        _ => messages::ALREADY_RUNNING.into(),
    }
}

/// Poll `transport` and answer every message until the orchestrator stops.
pub async fn listen(orch: Orchestrator, transport: Arc<dyn ChatTransport>) {
    info!("chat listener started");
    loop {
        let batch = tokio::select! {
            _ = orch.wait_stopped() => break,
            batch = transport.next_messages() => batch,
        };

        match batch {
            Ok(inbound) => {
                for message in inbound {
                    handle(&orch, transport.as_ref(), message).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "fetching chat updates failed");
                tokio::time::sleep(TRANSPORT_BACKOFF).await;
            }
        }
    }
    info!("chat listener stopped");
}

async fn handle(orch: &Orchestrator, transport: &dyn ChatTransport, message: InboundMessage) {
    let command = BotCommand::parse(&message.text);
    debug!(chat = %message.chat, ?command, "command received");
    let reply = dispatch(orch, message.chat, command).await;
    if let Err(err) = transport.reply(message.chat, &reply).await {
        warn!(chat = %message.chat, error = %err, "reply not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Ledger;
    use crate::orchestrator::PipelineSettings;
    use crate::state_machine::ApplicationState;
    use crate::test_support::{
        Harness, ScriptedSource, ScriptedTransport, StubCustomizer, StubSubmitter, eventually,
        posting,
    };

    const OWNER: ChatId = ChatId(1);

    fn harness() -> Harness {
        Harness::new(
            ScriptedSource::new(vec![Ok(vec![posting(1)])]),
            StubCustomizer::default(),
            StubSubmitter::default(),
        )
    }

    fn orchestrator(h: &Harness) -> Orchestrator {
        let settings = PipelineSettings {
            base_cv: "Jane Doe, Python".into(),
            posting_delay: Duration::ZERO,
            ..PipelineSettings::default()
        };
        Orchestrator::new(settings, h.collaborators(), [OWNER])
    }

    #[test]
    fn parses_slash_commands() {
        assert_eq!(BotCommand::parse("/start"), BotCommand::Start);
        assert_eq!(BotCommand::parse("/stop"), BotCommand::Pause);
        assert_eq!(BotCommand::parse("/pause"), BotCommand::Pause);
        assert_eq!(BotCommand::parse("/STATUS@jobpilot_bot"), BotCommand::Status);
        assert_eq!(BotCommand::parse("/get_cv"), BotCommand::GetCv);
        assert_eq!(BotCommand::parse("/nonsense"), BotCommand::Help);
        assert_eq!(
            BotCommand::parse("/offer 1a2b3c4d start in March"),
            BotCommand::Offer {
                id: Some(AttemptId("1a2b3c4d".into())),
                note: "start in March".into()
            }
        );
        assert_eq!(
            BotCommand::parse("/approve 4"),
            BotCommand::Reply {
                verdict: Verdict::Approve,
                id: Some(RequestId(4))
            }
        );
        assert_eq!(
            BotCommand::parse("/decline"),
            BotCommand::Reply {
                verdict: Verdict::Decline,
                id: None
            }
        );
    }

    #[test]
    fn parses_free_text() {
        assert_eq!(
            BotCommand::parse("Yes #2"),
            BotCommand::Reply {
                verdict: Verdict::Approve,
                id: Some(RequestId(2))
            }
        );
        assert_eq!(
            BotCommand::parse("skip"),
            BotCommand::Reply {
                verdict: Verdict::Decline,
                id: None
            }
        );
        assert_eq!(BotCommand::parse("thanks a lot"), BotCommand::Thanks);
        assert_eq!(BotCommand::parse("can you find me a job?"), BotCommand::FindJobs);
        assert_eq!(BotCommand::parse("hello"), BotCommand::Help);
        assert_eq!(BotCommand::parse("   "), BotCommand::Help);
    }

    #[tokio::test]
    async fn unsubscribed_chats_only_get_public_commands() {
        let h = harness();
        let orch = orchestrator(&h);
        let stranger = ChatId(99);

        assert_eq!(
            dispatch(&orch, stranger, BotCommand::Pause).await,
            messages::NOT_SUBSCRIBED
        );
        assert_eq!(orch.control_state(), ControlState::Idle);
        assert_eq!(dispatch(&orch, stranger, BotCommand::Help).await, messages::HELP);

        assert_eq!(
            dispatch(&orch, stranger, BotCommand::Subscribe).await,
            messages::SUBSCRIBED
        );
        assert_eq!(
            dispatch(&orch, stranger, BotCommand::Subscribe).await,
            messages::ALREADY_SUBSCRIBED
        );
        assert_eq!(dispatch(&orch, stranger, BotCommand::Pause).await, messages::PAUSED);
        assert_eq!(
            dispatch(&orch, stranger, BotCommand::Unsubscribe).await,
            messages::UNSUBSCRIBED
        );
        assert!(!orch.is_subscribed(stranger));
    }

    #[tokio::test]
    async fn control_commands_drive_the_orchestrator() {
        let h = harness();
        let orch = orchestrator(&h);

        assert_eq!(dispatch(&orch, OWNER, BotCommand::Start).await, messages::WELCOME);
        assert_eq!(
            dispatch(&orch, OWNER, BotCommand::Start).await,
            messages::ALREADY_RUNNING
        );
        assert_eq!(dispatch(&orch, OWNER, BotCommand::Pause).await, messages::PAUSED);
        assert_eq!(orch.control_state(), ControlState::Paused);
        assert_eq!(dispatch(&orch, OWNER, BotCommand::Resume).await, messages::RESUMED);

        orch.stop();
        assert_eq!(dispatch(&orch, OWNER, BotCommand::Resume).await, messages::STOPPED);
        assert_eq!(dispatch(&orch, OWNER, BotCommand::Pause).await, messages::STOPPED);
    }

    #[tokio::test]
    async fn read_only_commands() {
        let h = harness();
        let orch = orchestrator(&h);

        let status = dispatch(&orch, OWNER, BotCommand::Status).await;
        assert!(status.contains("Status: Idle"));
        assert!(status.contains("Query: Python Developer"));

        let stats = dispatch(&orch, OWNER, BotCommand::Stats).await;
        assert!(stats.contains("Total Applications: 0"));

        let cv = dispatch(&orch, OWNER, BotCommand::GetCv).await;
        assert!(cv.ends_with("Jane Doe, Python"));

        assert_eq!(
            dispatch(&orch, OWNER, BotCommand::parse("/offer")).await,
            messages::OFFER_USAGE
        );
        let rejected = dispatch(&orch, OWNER, BotCommand::parse("/offer ffff")).await;
        assert_eq!(rejected, "Offer rejected: no attempt with id ffff");
        assert_eq!(
            dispatch(&orch, OWNER, BotCommand::parse("yes")).await,
            "No job is waiting for an answer."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn yes_reply_approves_the_pending_job() {
        let harness = harness();
        let h = &harness;
        let orch = orchestrator(h);
        orch.start();
        let run = orch.spawn();

        let o = &orch;
        eventually(move || async move { !o.pending_confirmations().is_empty() }).await;
        let answer = dispatch(&orch, OWNER, BotCommand::parse("yes")).await;
        assert_eq!(answer, "👍 #1 approved: Python Developer 1 at TechCorp 1");

        eventually(move || async move {
            h.ledger
                .records()
                .await
                .unwrap()
                .first()
                .is_some_and(|r| r.status == ApplicationState::Submitted)
        })
        .await;

        assert_eq!(
            dispatch(&orch, OWNER, BotCommand::parse("no 1")).await,
            "No pending job #1."
        );
        orch.stop();
        run.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn listener_answers_each_message_until_stopped() {
        let h = harness();
        let orch = orchestrator(&h);
        let transport = Arc::new(ScriptedTransport::new(vec![
            (1, "/status"),
            (2, "/stats"),
            (2, "/subscribe"),
            (1, "thank you!"),
        ]));
        let listener = tokio::spawn(listen(orch.clone(), transport.clone()));

        let t = transport.as_ref();
        eventually(move || async move { t.replies().len() == 4 }).await;
        orch.stop();
        listener.await.unwrap();

        let replies = transport.replies();
        assert_eq!(replies[0].0, ChatId(1));
        assert!(replies[0].1.contains("Current Search Status"));
        assert_eq!(replies[1], (ChatId(2), messages::NOT_SUBSCRIBED.to_string()));
        assert_eq!(replies[2], (ChatId(2), messages::SUBSCRIBED.to_string()));
        assert_eq!(replies[3].1, messages::THANKS);
        assert!(orch.is_subscribed(ChatId(2)));
    }
}

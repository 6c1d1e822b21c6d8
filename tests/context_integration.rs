//! Integration tests for a full cockpit session
//!
//! Both brains run on scripted backends so the tests control what each
//! engine answers and how long it takes.

use async_trait::async_trait;
use lab_cockpit::brain::Brain;
use lab_cockpit::config::{EngineConfig, LabConfig};
use lab_cockpit::context::LabContext;
use lab_cockpit::engine::{BackendError, EngineAdapter, EngineError, InferenceBackend};
use lab_cockpit::feeder::{BufferVersion, LineId};
use lab_cockpit::patch::PatchOperation;
use lab_cockpit::router::Reply;
use lab_cockpit::save::SaveMode;
use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// One scripted answer: how long to think, then what to say.
#[derive(Clone)]
struct Step {
    delay: Duration,
    reply: String,
}

fn step(delay_ms: u64, reply: &str) -> Step {
    Step {
        delay: Duration::from_millis(delay_ms),
        reply: reply.to_string(),
    }
}

/// Plays back `steps` in order, then repeats the last one.
struct Scripted {
    steps: VecDeque<Step>,
    last: Step,
    loadable: bool,
    loaded: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl InferenceBackend for Scripted {
    async fn generate(&mut self, prompt: &str, _max_context: usize) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let step = match self.steps.pop_front() {
            Some(step) => {
                self.last = step.clone();
                step
            }
            None => self.last.clone(),
        };
        tokio::time::sleep(step.delay).await;
        Ok(step.reply)
    }

    async fn load(&mut self, _model: &str) -> Result<(), BackendError> {
        if !self.loadable {
            return Err(BackendError::Request("no such model".into()));
        }
        self.loaded = true;
        Ok(())
    }

    async fn unload(&mut self) {
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

fn engine(brain: Brain, steps: Vec<Step>) -> (EngineAdapter, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let last = steps.last().cloned().unwrap_or_else(|| step(0, ""));
    let backend = Scripted {
        steps: steps.into(),
        last,
        loadable: true,
        loaded: false,
        prompts: Arc::clone(&prompts),
    };
    let adapter = EngineAdapter::new(brain, Box::new(backend), &EngineConfig::default());
    (adapter, prompts)
}

fn broken_engine(brain: Brain) -> EngineAdapter {
    let backend = Scripted {
        steps: VecDeque::new(),
        last: step(0, ""),
        loadable: false,
        loaded: false,
        prompts: Arc::new(Mutex::new(Vec::new())),
    };
    EngineAdapter::new(brain, Box::new(backend), &EngineConfig::default())
}

/// Answers with `reply` and cancels `token` as it does, like a user hitting
/// stop just as generation finishes.
struct CancelsOnReply {
    reply: String,
    token: CancellationToken,
    loaded: bool,
}

#[async_trait]
impl InferenceBackend for CancelsOnReply {
    async fn generate(&mut self, _prompt: &str, _max_context: usize) -> Result<String, BackendError> {
        self.token.cancel();
        Ok(self.reply.clone())
    }

    async fn load(&mut self, _model: &str) -> Result<(), BackendError> {
        self.loaded = true;
        Ok(())
    }

    async fn unload(&mut self) {
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn describe(&self) -> String {
        "cancels-on-reply".into()
    }
}

fn config(state: &TempDir) -> LabConfig {
    let mut config = LabConfig::default();
    config.state.dir = Some(state.path().display().to_string());
    config
}

fn lines(ctx: &LabContext) -> Vec<String> {
    ctx.feeder()
        .snapshot()
        .iter()
        .map(|(_, text)| text.to_string())
        .collect()
}

#[tokio::test]
async fn scriptor_patch_is_applied_and_journaled() {
    let state = TempDir::new().unwrap();
    let (scriptor, prompts) = engine(
        Brain::Scriptor,
        vec![step(0, "<<<PATCH\nREPLACE \"b\" TO \"c\"\nB\nC\nPATCH>>>")],
    );
    let (master, _) = engine(Brain::Master, vec![step(0, "unused")]);
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb\nc\nd\ne", None)
        .await
        .unwrap();

    let turn = ctx.ask("fix the b and c lines").await.unwrap();
    assert_eq!(turn.dispatch.brain, Brain::Scriptor);
    assert_eq!(turn.dispatch.version, BufferVersion(0));
    assert_eq!(turn.outcome.unwrap().version(), Some(BufferVersion(1)));
    assert_eq!(lines(&ctx), vec!["a", "B", "C", "d", "e"]);

    let prompt = prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("#2| b"));
    assert!(prompt.contains("fix the b and c lines"));

    let journal = fs::read_to_string(state.path().join("memory.log")).unwrap();
    assert!(journal.contains("[SCRIPTOR USER] fix the b and c lines"));
    assert!(journal.contains("[SCRIPTOR AI] <<<PATCH"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn concurrent_brains_commit_one_batch_at_a_time() {
    let state = TempDir::new().unwrap();
    let (scriptor, _) = engine(
        Brain::Scriptor,
        vec![step(30, "<<<PATCH\nREPLACE #1\nA\nPATCH>>>")],
    );
    let (master, _) = engine(
        Brain::Master,
        vec![step(10, "Plan: add a tail.\n<<<PATCH\nINSERT AFTER #4\ne\nPATCH>>>")],
    );
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb\nc\nd", None)
        .await
        .unwrap();
    let mut events = ctx.feeder().subscribe();

    let (code, plan) = tokio::join!(
        ctx.ask("fix the first line"),
        ctx.ask("plan the next step"),
    );
    let code = code.unwrap();
    let plan = plan.unwrap();
    assert_eq!(code.dispatch.brain, Brain::Scriptor);
    assert_eq!(plan.dispatch.brain, Brain::Master);
    assert!(code.outcome.unwrap().is_committed());
    assert!(plan.outcome.unwrap().is_committed());

    // Master answered first; each commit saw the other's complete result.
    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!(first.version, BufferVersion(1));
    assert_eq!(first.line_count, 5);
    assert_eq!(second.version, BufferVersion(2));
    assert_eq!(second.line_count, 5);
    assert_eq!(lines(&ctx), vec!["A", "b", "c", "d", "e"]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn timeout_leaves_buffer_alone_and_frees_the_engine() {
    let state = TempDir::new().unwrap();
    let (scriptor, _) = engine(
        Brain::Scriptor,
        vec![
            step(500, "<<<PATCH\nDELETE #1\nPATCH>>>"),
            step(0, "<<<PATCH\nREPLACE #1\nA\nPATCH>>>"),
        ],
    );
    let scriptor = scriptor.with_deadline(Duration::from_millis(50));
    let (master, _) = engine(Brain::Master, vec![step(0, "unused")]);
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb", None)
        .await
        .unwrap();

    let err = ctx.ask("fix line a").await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.brain(), Brain::Scriptor);
    assert_eq!(ctx.feeder().snapshot_version(), BufferVersion(0));
    assert_eq!(lines(&ctx), vec!["a", "b"]);

    let turn = ctx.ask("fix line a").await.unwrap();
    assert!(turn.outcome.unwrap().is_committed());
    assert_eq!(lines(&ctx), vec!["A", "b"]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn unavailable_brain_does_not_block_the_other() {
    let state = TempDir::new().unwrap();
    let (scriptor, _) = engine(Brain::Scriptor, vec![step(0, "ok")]);
    let ctx = LabContext::start_with_engines(
        config(&state),
        scriptor,
        broken_engine(Brain::Master),
        "a",
        None,
    )
    .await
    .unwrap();

    let status = ctx.status();
    assert!(status.iter().any(|s| s.brain == Brain::Scriptor && s.ready));
    assert!(status.iter().any(|s| s.brain == Brain::Master && !s.ready));

    let err = ctx.ask("explain the design").await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable { brain: Brain::Master, .. }));

    let turn = ctx.ask("fix it").await.unwrap();
    assert_eq!(turn.dispatch.reply, Reply::Plain("ok".into()));
    assert!(turn.outcome.is_none());

    ctx.shutdown().await;
}

#[tokio::test]
async fn rejected_patch_keeps_the_session_usable() {
    let state = TempDir::new().unwrap();
    let (scriptor, _) = engine(
        Brain::Scriptor,
        vec![
            step(0, "<<<PATCH\nDELETE #9\nPATCH>>>"),
            step(0, "<<<PATCH\nDELETE #2\nPATCH>>>"),
        ],
    );
    let (master, _) = engine(Brain::Master, vec![step(0, "unused")]);
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb", None)
        .await
        .unwrap();

    let first = ctx.ask("fix it").await.unwrap();
    let rejection = first.outcome.unwrap();
    assert!(rejection.rejection().unwrap().reason.is_stale());
    assert_eq!(ctx.feeder().snapshot_version(), BufferVersion(0));

    let second = ctx.ask("fix it").await.unwrap();
    assert!(second.outcome.unwrap().is_committed());
    assert_eq!(lines(&ctx), vec!["a"]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn forced_brain_without_apply_returns_patch_untouched() {
    let state = TempDir::new().unwrap();
    let (scriptor, _) = engine(Brain::Scriptor, vec![step(0, "unused")]);
    let (master, prompts) = engine(
        Brain::Master,
        vec![step(0, "<<<PATCH\nDELETE #1\nPATCH>>>")],
    );
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb", None)
        .await
        .unwrap();

    let turn = ctx
        .ask_with(Some(Brain::Master), "fix it", false, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(turn.dispatch.brain, Brain::Master);
    assert!(turn.dispatch.patch().is_some());
    assert!(turn.outcome.is_none());
    assert_eq!(ctx.feeder().snapshot_version(), BufferVersion(0));
    assert!(prompts.lock().unwrap()[0].contains("2 lines"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn save_writes_source_and_patched_copy() {
    let state = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let source = work.path().join("notes.txt");
    fs::write(&source, "a\nb\n").unwrap();

    let (scriptor, _) = engine(
        Brain::Scriptor,
        vec![step(0, "<<<PATCH\nREPLACE #2\nB\nPATCH>>>")],
    );
    let (master, _) = engine(Brain::Master, vec![step(0, "unused")]);
    let ctx = LabContext::start_with_engines(
        config(&state),
        scriptor,
        master,
        "a\nb\n",
        Some(source.clone()),
    )
    .await
    .unwrap();

    assert!(ctx.ask("fix line b").await.unwrap().outcome.unwrap().is_committed());

    let copy = ctx.save(SaveMode::PatchedCopy).unwrap();
    assert_ne!(copy, source);
    assert_eq!(fs::read_to_string(&copy).unwrap(), "a\nB\n");
    assert_eq!(fs::read_to_string(&source).unwrap(), "a\nb\n");

    ctx.save(SaveMode::InPlace).unwrap();
    assert_eq!(fs::read_to_string(&source).unwrap(), "a\nB\n");

    ctx.shutdown().await;
}

#[tokio::test]
async fn cancel_during_generation_leaves_buffer_and_frees_the_engine() {
    let state = TempDir::new().unwrap();
    let (scriptor, _) = engine(
        Brain::Scriptor,
        vec![
            step(500, "<<<PATCH\nDELETE #1\nPATCH>>>"),
            step(0, "<<<PATCH\nREPLACE #1\nA\nPATCH>>>"),
        ],
    );
    let (master, _) = engine(Brain::Master, vec![step(0, "unused")]);
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb", None)
        .await
        .unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    let err = ctx.ask_with(None, "fix line a", true, &token).await.unwrap_err();
    assert_eq!(err, EngineError::Cancelled { brain: Brain::Scriptor });
    assert_eq!(ctx.feeder().snapshot_version(), BufferVersion(0));
    assert_eq!(lines(&ctx), vec!["a", "b"]);

    let turn = ctx.ask("fix line a").await.unwrap();
    assert!(turn.outcome.unwrap().is_committed());
    assert_eq!(lines(&ctx), vec!["A", "b"]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn cancel_after_generation_discards_the_patch() {
    let state = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let backend = CancelsOnReply {
        reply: "<<<PATCH\nDELETE #1\nPATCH>>>".into(),
        token: token.clone(),
        loaded: false,
    };
    let scriptor = EngineAdapter::new(Brain::Scriptor, Box::new(backend), &EngineConfig::default());
    let (master, _) = engine(Brain::Master, vec![step(0, "unused")]);
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb", None)
        .await
        .unwrap();

    let err = ctx.ask_with(None, "fix line a", true, &token).await.unwrap_err();
    assert_eq!(err, EngineError::Cancelled { brain: Brain::Scriptor });
    assert_eq!(ctx.feeder().snapshot_version(), BufferVersion(0));
    assert_eq!(lines(&ctx), vec!["a", "b"]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn late_completion_cannot_overwrite_a_newer_user_line() {
    let state = TempDir::new().unwrap();
    let (scriptor, _) = engine(
        Brain::Scriptor,
        vec![step(50, "<<<PATCH\nREPLACE #2 TO #4\nX\nPATCH>>>")],
    );
    let (master, _) = engine(Brain::Master, vec![step(0, "unused")]);
    let ctx = LabContext::start_with_engines(config(&state), scriptor, master, "a\nb\nc\nd\ne", None)
        .await
        .unwrap();

    let user_edit = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.autopatcher().apply_user_edit(vec![PatchOperation::insert_after(
            LineId(2),
            vec!["USER".to_string()],
        )])
    };
    let (turn, edit) = tokio::join!(ctx.ask("fix lines b to d"), user_edit);
    assert!(edit.is_committed());

    let turn = turn.unwrap();
    assert_eq!(turn.dispatch.version, BufferVersion(0));
    assert!(turn.outcome.unwrap().rejection().unwrap().reason.is_stale());
    assert_eq!(lines(&ctx), vec!["a", "b", "USER", "c", "d", "e"]);

    ctx.shutdown().await;
}

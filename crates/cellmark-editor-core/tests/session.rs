use std::cell::Cell;
use std::time::Duration;

use cellmark_common::SessionConfig;
use cellmark_editor_core::{
    CellRef, CellStore, EditingSession, MemoryCellStore, SaveOutcome, SaveState, SessionError,
    StoreError, SwitchDecision, SwitchOutcome, drive_autosave,
};
use tokio::sync::Notify;

fn first() -> CellRef {
    CellRef::new("rec1", "notes")
}

fn second() -> CellRef {
    CellRef::new("rec2", "notes")
}

fn third() -> CellRef {
    CellRef::new("rec3", "notes")
}

fn seeded() -> MemoryCellStore {
    MemoryCellStore::new()
        .with_cell(first(), "one")
        .with_cell(second(), "two")
        .with_cell(third(), "three")
}

async fn open(store: &MemoryCellStore) -> EditingSession<&MemoryCellStore> {
    EditingSession::open(store, &SessionConfig::default(), first())
        .await
        .unwrap()
}

/// A store whose reads and writes can be held until released.
#[derive(Default)]
struct GatedStore {
    inner: MemoryCellStore,
    hold_reads: Cell<bool>,
    hold_writes: Cell<bool>,
    reads: Notify,
    writes: Notify,
}

impl GatedStore {
    fn seeded() -> Self {
        Self {
            inner: seeded(),
            ..Self::default()
        }
    }
}

impl CellStore for GatedStore {
    async fn read_cell(&self, cell: &CellRef) -> Result<String, StoreError> {
        if self.hold_reads.get() {
            self.reads.notified().await;
        }
        self.inner.read_cell(cell).await
    }

    async fn write_cell(&self, cell: &CellRef, content: &str) -> Result<(), StoreError> {
        if self.hold_writes.get() {
            self.writes.notified().await;
        }
        self.inner.write_cell(cell, content).await
    }
}

async fn open_gated(store: &GatedStore) -> EditingSession<&GatedStore> {
    EditingSession::open(store, &SessionConfig::default(), first())
        .await
        .unwrap()
}

#[tokio::test]
async fn edit_save_cycle_with_a_single_write_in_flight() {
    let store = GatedStore::seeded();
    let session = open_gated(&store).await;
    assert_eq!(session.save_state(), SaveState::Clean);

    session.set_content("a");
    assert_eq!(session.save_state(), SaveState::Dirty);

    store.hold_writes.set(true);
    let (saved, again, ()) = tokio::join!(session.save(), session.save(), async {
        assert_eq!(session.save_state(), SaveState::Saving);
        store.writes.notify_one();
    });

    assert_eq!(saved, Ok(SaveOutcome::Saved));
    assert_eq!(again, Ok(SaveOutcome::AlreadySaving));
    assert_eq!(store.inner.write_count(), 1);
    assert_eq!(session.save_state(), SaveState::Clean);
    assert_eq!(session.saved_content(), "a");
    assert_eq!(store.inner.get(&first()).as_deref(), Some("a"));
}

#[tokio::test]
async fn reverting_an_edit_is_clean_again() {
    let store = seeded();
    let session = open(&store).await;
    session.set_content("one!");
    assert_eq!(session.save_state(), SaveState::Dirty);
    session.set_content("one");
    assert_eq!(session.save_state(), SaveState::Clean);
    assert_eq!(session.version(), 2);
}

#[tokio::test]
async fn saving_clean_or_unbound_sessions_does_nothing() {
    let store = seeded();
    let session = open(&store).await;
    assert_eq!(session.save().await, Ok(SaveOutcome::AlreadyClean));

    let scratch = EditingSession::with_content(&store, &SessionConfig::default(), "draft");
    scratch.set_content("draft 2");
    assert_eq!(scratch.save().await, Ok(SaveOutcome::Unbound));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn failed_save_keeps_content_and_can_be_retried() {
    let store = seeded();
    let session = open(&store).await;
    session.set_content("a");

    store.fail_next_write(StoreError::Unavailable("offline".into()));
    let error = session.save().await.unwrap_err();
    assert!(matches!(error, SessionError::Write { .. }));
    assert_eq!(
        session.save_state(),
        SaveState::Error("store unavailable: offline".into())
    );
    assert_eq!(session.content(), "a");
    assert_eq!(session.saved_content(), "one");

    assert_eq!(session.save().await, Ok(SaveOutcome::Saved));
    assert_eq!(session.save_state(), SaveState::Clean);
    assert_eq!(store.get(&first()).as_deref(), Some("a"));
}

#[tokio::test]
async fn editing_after_a_failed_save_is_dirty() {
    let store = seeded();
    let session = open(&store).await;
    session.set_content("a");
    store.fail_next_write(StoreError::Rejected("read only".into()));
    assert!(session.save().await.is_err());
    session.set_content("ab");
    assert_eq!(session.save_state(), SaveState::Dirty);
}

#[tokio::test]
async fn edits_during_a_save_leave_the_session_dirty() {
    let store = GatedStore::seeded();
    let session = open_gated(&store).await;
    session.set_content("a");
    store.hold_writes.set(true);

    let (saved, ()) = tokio::join!(session.save(), async {
        session.set_content("ab");
        assert_eq!(session.save_state(), SaveState::Saving);
        store.writes.notify_one();
    });

    assert_eq!(saved, Ok(SaveOutcome::Saved));
    assert_eq!(session.saved_content(), "a");
    assert_eq!(session.content(), "ab");
    assert_eq!(session.save_state(), SaveState::Dirty);
    assert!(session.autosave_ticket().is_some());
}

#[tokio::test]
async fn clean_switch_loads_without_a_prompt() {
    let store = seeded();
    let session = open(&store).await;
    assert_eq!(
        session.request_cell_switch(second()).await,
        Ok(SwitchOutcome::Switched)
    );
    assert_eq!(session.active_cell(), Some(second()));
    assert_eq!(session.content(), "two");
    assert!(!session.prompt_pending());
    assert_eq!(
        session.request_cell_switch(second()).await,
        Ok(SwitchOutcome::AlreadyActive)
    );
}

#[tokio::test]
async fn dirty_switch_prompts_once_and_discard_never_writes() {
    let store = seeded();
    let session = open(&store).await;
    let mut changes = session.subscribe();
    session.set_content("edited");

    assert_eq!(
        session.request_cell_switch(second()).await,
        Ok(SwitchOutcome::Prompted)
    );
    assert!(changes.has_changed().unwrap());
    let snapshot = changes.borrow_and_update().clone();
    assert!(snapshot.prompt_pending);
    assert_eq!(snapshot.pending_cell, Some(second()));
    assert_eq!(snapshot.save_state, SaveState::Dirty);
    assert_eq!(store.write_count(), 0);
    assert!(session.autosave_ticket().is_none());

    // Asking again retargets the same prompt.
    assert_eq!(
        session.request_cell_switch(third()).await,
        Ok(SwitchOutcome::Retargeted)
    );
    assert_eq!(session.pending_cell(), Some(third()));

    assert_eq!(
        session.resolve_switch_prompt(SwitchDecision::Discard).await,
        Ok(SwitchOutcome::Switched)
    );
    assert_eq!(store.write_count(), 0);
    assert_eq!(store.get(&first()).as_deref(), Some("one"));
    assert_eq!(session.active_cell(), Some(third()));
    assert_eq!(session.content(), "three");
    assert_eq!(session.save_state(), SaveState::Clean);
    assert_eq!(session.version(), 0);
    assert!(!changes.borrow_and_update().prompt_pending);
}

#[tokio::test]
async fn save_then_switch_writes_first() {
    let store = seeded();
    let session = open(&store).await;
    session.set_content("edited");
    session.request_cell_switch(second()).await.unwrap();

    assert_eq!(
        session
            .resolve_switch_prompt(SwitchDecision::SaveThenSwitch)
            .await,
        Ok(SwitchOutcome::Switched)
    );
    assert_eq!(store.write_count(), 1);
    assert_eq!(store.get(&first()).as_deref(), Some("edited"));
    assert_eq!(session.content(), "two");
    assert_eq!(session.save_state(), SaveState::Clean);
}

#[tokio::test]
async fn failed_save_then_switch_abandons_the_switch() {
    let store = seeded();
    let session = open(&store).await;
    session.set_content("edited");
    session.request_cell_switch(second()).await.unwrap();

    store.fail_next_write(StoreError::Unavailable("offline".into()));
    let result = session
        .resolve_switch_prompt(SwitchDecision::SaveThenSwitch)
        .await;
    assert!(matches!(result, Err(SessionError::Write { .. })));
    assert!(!session.prompt_pending());
    assert_eq!(session.active_cell(), Some(first()));
    assert_eq!(session.content(), "edited");
    assert!(matches!(session.save_state(), SaveState::Error(_)));
}

#[tokio::test]
async fn failed_read_keeps_the_prompt() {
    let store = seeded();
    let session = open(&store).await;
    session.set_content("edited");
    session.request_cell_switch(second()).await.unwrap();

    store.fail_next_read(StoreError::Unavailable("offline".into()));
    let result = session.resolve_switch_prompt(SwitchDecision::Discard).await;
    assert!(matches!(result, Err(SessionError::Read { .. })));
    assert!(session.prompt_pending());
    assert_eq!(session.content(), "edited");

    assert_eq!(
        session.resolve_switch_prompt(SwitchDecision::Discard).await,
        Ok(SwitchOutcome::Switched)
    );
    assert_eq!(session.content(), "two");
}

#[tokio::test]
async fn failed_read_on_a_clean_switch_leaves_the_session_alone() {
    let store = seeded();
    let session = open(&store).await;
    let before = session.snapshot();
    store.fail_next_read(StoreError::Unavailable("offline".into()));
    assert!(session.request_cell_switch(second()).await.is_err());
    assert_eq!(session.snapshot(), before);
}

#[tokio::test]
async fn errored_content_counts_as_unsaved_when_switching() {
    let store = seeded();
    let session = open(&store).await;
    session.set_content("edited");
    store.fail_next_write(StoreError::Unavailable("offline".into()));
    assert!(session.save().await.is_err());

    assert_eq!(
        session.request_cell_switch(second()).await,
        Ok(SwitchOutcome::Prompted)
    );
}

#[tokio::test]
async fn scratch_sessions_switch_without_a_prompt() {
    let store = seeded();
    let session = EditingSession::with_content(&store, &SessionConfig::default(), "welcome");
    session.set_content("typed before binding");
    assert_eq!(
        session.request_cell_switch(first()).await,
        Ok(SwitchOutcome::Switched)
    );
    assert_eq!(session.content(), "one");
}

#[tokio::test]
async fn resolving_without_a_prompt_is_an_error() {
    let store = seeded();
    let session = open(&store).await;
    assert_eq!(
        session.resolve_switch_prompt(SwitchDecision::Discard).await,
        Err(SessionError::NoPendingSwitch)
    );
}

#[tokio::test]
async fn concurrent_resolution_is_refused() {
    let store = GatedStore::seeded();
    let session = open_gated(&store).await;
    session.set_content("edited");
    session.request_cell_switch(second()).await.unwrap();
    store.hold_reads.set(true);

    let (resolved, refused, ()) = tokio::join!(
        session.resolve_switch_prompt(SwitchDecision::Discard),
        session.resolve_switch_prompt(SwitchDecision::Discard),
        async { store.reads.notify_one() }
    );
    assert_eq!(resolved, Ok(SwitchOutcome::Switched));
    assert_eq!(refused, Err(SessionError::SwitchInProgress));
}

#[tokio::test]
async fn switch_during_a_save_waits_for_it() {
    let store = GatedStore::seeded();
    let session = open_gated(&store).await;
    session.set_content("a");
    store.hold_writes.set(true);

    let (saved, switched, ()) = tokio::join!(
        session.save(),
        session.request_cell_switch(second()),
        async {
            assert!(!session.prompt_pending());
            assert_eq!(session.active_cell(), Some(first()));
            store.writes.notify_one();
        }
    );
    assert_eq!(saved, Ok(SaveOutcome::Saved));
    assert_eq!(switched, Ok(SwitchOutcome::Switched));
    assert_eq!(store.inner.get(&first()).as_deref(), Some("a"));
    assert_eq!(session.content(), "two");
}

#[tokio::test]
async fn edits_during_a_switch_read_are_not_overwritten() {
    let store = GatedStore::seeded();
    let session = open_gated(&store).await;
    store.hold_reads.set(true);

    let (switched, ()) = tokio::join!(session.request_cell_switch(second()), async {
        session.set_content("typed meanwhile");
        store.reads.notify_one();
    });
    assert_eq!(switched, Ok(SwitchOutcome::Prompted));
    assert_eq!(session.content(), "typed meanwhile");
    assert_eq!(session.active_cell(), Some(first()));
}

#[tokio::test(start_paused = true)]
async fn autosave_debounces_edits() {
    let store = seeded();
    let session = open(&store).await;

    tokio::select! {
        _ = drive_autosave(&session) => unreachable!(),
        _ = async {
            session.set_content("a");
            tokio::time::sleep(Duration::from_millis(1000)).await;
            session.set_content("ab");
            tokio::time::sleep(Duration::from_millis(1000)).await;
            assert_eq!(store.write_count(), 0);
            tokio::time::sleep(Duration::from_millis(600)).await;
            assert_eq!(store.write_count(), 1);
        } => {}
    }
    assert_eq!(store.get(&first()).as_deref(), Some("ab"));
    assert_eq!(session.save_state(), SaveState::Clean);
}

#[tokio::test(start_paused = true)]
async fn autosave_waits_while_a_prompt_is_pending() {
    let store = seeded();
    let session = open(&store).await;

    tokio::select! {
        _ = drive_autosave(&session) => unreachable!(),
        _ = async {
            session.set_content("a");
            assert_eq!(
                session.request_cell_switch(second()).await,
                Ok(SwitchOutcome::Prompted)
            );
            session.set_content("ab");
            tokio::time::sleep(Duration::from_secs(10)).await;
        } => {}
    }
    assert_eq!(store.write_count(), 0);
    assert!(session.prompt_pending());
}

#[tokio::test(start_paused = true)]
async fn autosave_can_be_turned_off() {
    let store = seeded();
    let config = SessionConfig {
        autosave: false,
        ..SessionConfig::default()
    };
    let session = EditingSession::open(&store, &config, first()).await.unwrap();
    assert!(!session.autosave_enabled());

    tokio::select! {
        _ = drive_autosave(&session) => unreachable!(),
        _ = async {
            session.set_content("a");
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(store.write_count(), 0);
            session.set_autosave(true);
            tokio::time::sleep(Duration::from_secs(2)).await;
        } => {}
    }
    assert_eq!(store.write_count(), 1);
}

//! Integration tests for the session lifecycle.
//!
//! These tests drive `ScanSession` end-to-end over the simulated engine:
//! commands go to the engine, the engine's events are pumped back through
//! `handle_event`, and the resulting state and notifications are checked.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scan_core::{
    ArtifactOrigin, Command, EngineError, EngineEvent, Notification, PipelineOperation, ScanError,
    ScanParameters, ScanningModeVersion, SessionState,
};
use scan_session::application::engine::EngineContext;
use scan_session::application::event_bridge::NotificationSink;
use scan_session::application::mesh_pipeline::MeshPipeline;
use scan_session::application::session_machine::{
    valid_states, ReadyAction, ScanSession, SessionOptions,
};
use scan_session::infrastructure::engine::{EngineCall, SimulatedEngine};
use scan_session::infrastructure::storage::mesh_store::{MeshStore, StoreLayout};
use tokio::sync::mpsc::UnboundedReceiver;

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Rig {
    engine: Arc<SimulatedEngine>,
    events: UnboundedReceiver<EngineEvent>,
    session: ScanSession,
    notifications: UnboundedReceiver<Notification>,
}

impl Rig {
    fn new(options: SessionOptions) -> Self {
        let (engine, events) = SimulatedEngine::new();
        let engine = Arc::new(engine);
        let (sink, notifications) = NotificationSink::channel();
        let session = ScanSession::new(EngineContext::new(engine.clone()), options, sink);
        Self {
            engine,
            events,
            session,
            notifications,
        }
    }

    /// Hands every pending engine event to the session.
    async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.session
                .handle_event(event)
                .await
                .expect("event handling must succeed");
        }
    }

    /// Walks the normal path until `target` is reached.
    async fn drive_to(&mut self, target: SessionState) {
        if target == SessionState::Uninitialized {
            return;
        }
        self.session.initialize_scanner(None).await.unwrap();
        if target == SessionState::Initialized {
            return self.pump().await;
        }
        self.session.start_preview().await.unwrap();
        if target == SessionState::Previewing {
            return self.pump().await;
        }
        self.session.start_scan().await.unwrap();
        if target == SessionState::Scanning {
            return self.pump().await;
        }
        self.session.stop_scan().await.unwrap();
        self.pump().await;
        assert_eq!(self.session.state(), SessionState::Viewing);
    }

    fn take_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }

    fn count_calls(&self, matches: impl Fn(&EngineCall) -> bool) -> usize {
        self.engine.calls().iter().filter(|c| matches(c)).count()
    }
}

const ALL_STATES: [SessionState; 5] = [
    SessionState::Uninitialized,
    SessionState::Initialized,
    SessionState::Previewing,
    SessionState::Scanning,
    SessionState::Viewing,
];

fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("scansession-{label}-{}", uuid::Uuid::new_v4()))
}

async fn issue(session: &mut ScanSession, command: Command) -> Result<(), ScanError> {
    match command {
        Command::InitializeScanner => session.initialize_scanner(None).await,
        Command::StartPreview => session.start_preview().await,
        Command::StartScan => session.start_scan().await,
        Command::StopScan => session.stop_scan().await,
        Command::GenerateMesh => session.generate_mesh().await,
        Command::SaveScan => session.save_scan(temp_dir("invalid").join("scan.ply")).await,
        Command::LoadMesh => session.load_mesh(temp_dir("invalid").join("scan.ply")).await,
        Command::SetScanParameters => session.set_scan_parameters(2.5).await,
        Command::SetScanningModeVersion => {
            session
                .set_scanning_mode_version(ScanningModeVersion::V1)
                .await
        }
        Command::ConfigureStreams => {
            session
                .configure_streams(scan_core::DeviceRole::Scanner.stream_config())
                .await
        }
        Command::ApplyMeshOperation => session.decimate(0.5).await,
        Command::ApplyViewportEdits => session.apply_viewport_edits(true).await,
        other => panic!("{other} is valid from every state"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_outside_their_states_are_refused_without_engine_calls() {
    let commands = [
        Command::InitializeScanner,
        Command::StartPreview,
        Command::StartScan,
        Command::StopScan,
        Command::GenerateMesh,
        Command::SaveScan,
        Command::LoadMesh,
        Command::SetScanParameters,
        Command::SetScanningModeVersion,
        Command::ConfigureStreams,
        Command::ApplyMeshOperation,
        Command::ApplyViewportEdits,
    ];

    for from in ALL_STATES {
        for command in commands {
            if valid_states(command).contains(&from) {
                continue;
            }

            // Arrange
            let mut rig = Rig::new(SessionOptions::default());
            rig.drive_to(from).await;
            rig.engine.clear_calls();

            // Act
            let result = issue(&mut rig.session, command).await;

            // Assert
            assert!(
                matches!(
                    result,
                    Err(ScanError::InvalidStateTransition { command: c, from: f })
                        if c == command && f == from
                ),
                "{command} from {from}: {result:?}"
            );
            assert_eq!(rig.session.state(), from, "{command} changed state");
            assert!(rig.engine.calls().is_empty(), "{command} reached the engine");
        }
    }
}

#[tokio::test]
async fn test_initialize_then_uninitialize_from_any_state_resets_session() {
    for from in ALL_STATES {
        // Arrange
        let mut rig = Rig::new(SessionOptions::default());
        rig.drive_to(from).await;

        // Act
        rig.session.uninitialize_scanner().await.unwrap();
        rig.pump().await;

        // Assert
        assert_eq!(rig.session.state(), SessionState::Uninitialized, "from {from}");
        assert!(rig.session.active_artifact().is_none(), "from {from}");
    }
}

#[tokio::test]
async fn test_repeated_ready_initializes_once() {
    // Arrange
    let mut rig = Rig::new(SessionOptions {
        ready_action: ReadyAction::InitializeAndPreview,
        ..SessionOptions::default()
    });

    // Act
    rig.engine.emit(EngineEvent::VisualizerReady);
    rig.engine.emit(EngineEvent::VisualizerReady);
    rig.pump().await;

    // Assert
    assert_eq!(
        rig.count_calls(|c| matches!(c, EngineCall::InitializeScanner(_))),
        1
    );
    assert_eq!(rig.session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_repeated_ready_while_uninitialized_is_swallowed() {
    // Arrange
    let mut rig = Rig::new(SessionOptions::default());

    // Act
    rig.engine.emit(EngineEvent::VisualizerReady);
    rig.engine.emit(EngineEvent::VisualizerReady);
    rig.pump().await;

    // Assert: one forwarded event and one state report
    let notifications = rig.take_notifications();
    assert_eq!(
        notifications,
        vec![
            Notification::Event(EngineEvent::VisualizerReady),
            Notification::StateChanged(SessionState::Uninitialized),
        ]
    );
    assert_eq!(rig.count_calls(|c| *c == EngineCall::CurrentState), 1);
}

#[tokio::test]
async fn test_ready_is_admitted_again_after_uninitialize() {
    let mut rig = Rig::new(SessionOptions {
        ready_action: ReadyAction::InitializeAndPreview,
        ..SessionOptions::default()
    });
    rig.engine.emit(EngineEvent::VisualizerReady);
    rig.pump().await;

    rig.session.uninitialize_scanner().await.unwrap();
    rig.engine.emit(EngineEvent::VisualizerReady);
    rig.pump().await;

    assert_eq!(
        rig.count_calls(|c| matches!(c, EngineCall::InitializeScanner(_))),
        2
    );
    assert_eq!(rig.session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_unit_size_is_scaled_for_v2_only() {
    // Arrange
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Previewing).await;

    // Act: v2
    rig.session.set_scan_parameters(2.5).await.unwrap();

    // Assert
    assert_eq!(rig.engine.voxel_size(), Some(2.5e-3));

    // Act: v1
    rig.session
        .set_scanning_mode_version(ScanningModeVersion::V1)
        .await
        .unwrap();
    let after_mode_change = rig.engine.voxel_size();
    rig.session.set_scan_parameters(2.5).await.unwrap();

    // Assert
    assert!(!rig.engine.v2_scanning());
    assert_eq!(after_mode_change, Some(2.5e-3), "mode change must not resend the size");
    assert_eq!(rig.engine.voxel_size(), Some(2.5));
}

#[tokio::test]
async fn test_configured_v1_mode_reaches_engine_before_unit_size() {
    // Arrange
    let mut rig = Rig::new(SessionOptions {
        parameters: ScanParameters {
            mode: ScanningModeVersion::V1,
            unit_size: 2.5,
        },
        ..SessionOptions::default()
    });

    // Act
    rig.drive_to(SessionState::Initialized).await;
    rig.session.set_scan_parameters(2.5).await.unwrap();

    // Assert
    assert_eq!(rig.session.scanning_mode_version(), ScanningModeVersion::V1);
    assert!(!rig.engine.v2_scanning());
    assert_eq!(rig.engine.voxel_size(), Some(2.5));
}

#[tokio::test]
async fn test_failed_mode_setup_keeps_session_uninitialized() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.engine
        .fail_next(Command::SetScanningModeVersion, EngineError::Unavailable);

    let result = rig.session.initialize_scanner(None).await;

    assert!(matches!(
        result,
        Err(ScanError::EngineCallFailed {
            operation: Command::SetScanningModeVersion,
            ..
        })
    ));
    assert_eq!(rig.session.state(), SessionState::Uninitialized);
    assert_eq!(rig.engine.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_displayed_unit_size_is_floored_to_one_decimal() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Initialized).await;

    rig.session.set_scan_parameters(2.37).await.unwrap();

    assert_eq!(rig.session.parameters().display_label(), "2.3");
    assert_eq!(
        ScanParameters {
            mode: ScanningModeVersion::V2,
            unit_size: 2.37
        }
        .display_size(),
        2.3
    );
}

#[tokio::test]
async fn test_stop_scan_without_generate_mesh_event_stays_scanning() {
    // Arrange
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Scanning).await;
    rig.engine.suppress_generate_mesh(true);

    // Act
    rig.session.stop_scan().await.unwrap();
    for _ in 0..5 {
        rig.pump().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Assert
    assert_eq!(rig.session.state(), SessionState::Scanning);
    assert!(rig.session.active_artifact().is_none());
    assert_eq!(rig.count_calls(|c| *c == EngineCall::GenerateMesh), 1);
}

#[tokio::test]
async fn test_generate_mesh_event_enters_viewing_with_new_artifact() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Scanning).await;

    rig.session.stop_scan().await.unwrap();
    rig.pump().await;

    assert_eq!(rig.session.state(), SessionState::Viewing);
    let artifact = rig.session.active_artifact().unwrap();
    assert_eq!(artifact.origin(), &ArtifactOrigin::Generated);
    assert!(artifact.path().is_none());
}

#[tokio::test]
async fn test_failed_smooth_keeps_decimation_and_retry_does_not_redecimate() {
    // Arrange
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Viewing).await;
    let pipeline = MeshPipeline::default()
        .then(PipelineOperation::Decimate { ratio: 0.9 })
        .then(PipelineOperation::Smooth { iterations: 10 });
    rig.session.decimate(0.9).await.unwrap();
    rig.engine.fail_next(
        Command::ApplyMeshOperation,
        EngineError::Rejected("smoothing failed".to_string()),
    );

    // Act: resume at the smoothing step
    let failed = pipeline.run_from(&mut rig.session, 1).await;

    // Assert
    assert!(matches!(
        failed,
        Err(ScanError::PipelineStepFailed { step: 1, .. })
    ));
    assert_eq!(
        rig.session.active_artifact().unwrap().applied(),
        &[PipelineOperation::Decimate { ratio: 0.9 }]
    );

    // Act: retry just the failed step
    let report = pipeline.run_from(&mut rig.session, 1).await.unwrap();

    // Assert
    assert_eq!(report.completed, vec![PipelineOperation::Smooth { iterations: 10 }]);
    assert_eq!(
        rig.session.active_artifact().unwrap().applied(),
        pipeline.operations()
    );
    assert_eq!(
        rig.count_calls(|c| matches!(
            c,
            EngineCall::ApplyMeshOperation(PipelineOperation::Decimate { .. })
        )),
        1
    );
}

#[tokio::test]
async fn test_save_then_load_from_viewing_resets_scanner_first() {
    // Arrange
    let root = temp_dir("store");
    let store = MeshStore::new(&root, StoreLayout::Nested);
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Viewing).await;
    let path = store.next_path();
    rig.session.save_scan(&path).await.unwrap();
    let generated_id = rig.session.active_artifact().unwrap().id();
    rig.engine.clear_calls();

    // Act
    rig.session.load_mesh(&path).await.unwrap();

    // Assert
    assert_eq!(
        rig.engine.calls(),
        vec![
            EngineCall::UninitializeScanner,
            EngineCall::InitializeScanner(Default::default()),
            EngineCall::SetV2Scanning(true),
            EngineCall::LoadMesh(path.clone()),
        ]
    );
    let artifact = rig.session.active_artifact().unwrap();
    assert_ne!(artifact.id(), generated_id);
    assert_eq!(artifact.origin(), &ArtifactOrigin::Loaded(path.clone()));
    assert_eq!(rig.session.state(), SessionState::Viewing);
    assert_eq!(store.list().unwrap().len(), 1);
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_failed_load_after_reset_leaves_initialized_without_mesh() {
    // Arrange
    let root = temp_dir("missing");
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Viewing).await;

    // Act
    let result = rig.session.load_mesh(root.join("absent.ply")).await;

    // Assert
    assert!(matches!(
        result,
        Err(ScanError::EngineCallFailed {
            operation: Command::LoadMesh,
            ..
        })
    ));
    assert_eq!(rig.session.state(), SessionState::Initialized);
    assert!(rig.session.active_artifact().is_none());
}

#[tokio::test]
async fn test_failed_reinitialize_during_load_leaves_uninitialized() {
    let root = temp_dir("reinit");
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Viewing).await;
    let path = root.join("scan.ply");
    rig.session.save_scan(&path).await.unwrap();
    rig.engine
        .fail_next(Command::InitializeScanner, EngineError::Unavailable);

    let result = rig.session.load_mesh(&path).await;

    assert!(matches!(
        result,
        Err(ScanError::EngineCallFailed {
            operation: Command::InitializeScanner,
            ..
        })
    ));
    assert_eq!(rig.session.state(), SessionState::Uninitialized);
    assert!(rig.session.active_artifact().is_none());
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_resave_overwrites_recorded_path() {
    let root = temp_dir("resave");
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Viewing).await;

    let unsaved = rig.session.resave_scan().await;
    let path = root.join("scan.ply");
    rig.session.save_scan(&path).await.unwrap();
    rig.session.smooth(3).await.unwrap();
    let resaved = rig.session.resave_scan().await.unwrap();

    assert!(matches!(unsaved, Err(ScanError::NotSaved)));
    assert_eq!(resaved, path);
    assert_eq!(
        rig.count_calls(|c| *c == EngineCall::SaveMesh(path.clone())),
        2
    );
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_failed_engine_call_keeps_state_and_reports_operation() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.drive_to(SessionState::Previewing).await;
    rig.engine
        .fail_next(Command::StartScan, EngineError::Unavailable);

    let result = rig.session.start_scan().await;

    assert!(matches!(
        result,
        Err(ScanError::EngineCallFailed {
            operation: Command::StartScan,
            source: EngineError::Unavailable,
        })
    ));
    assert_eq!(rig.session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_overlapping_state_queries_deliver_only_the_newest() {
    // Arrange: hold every state query at the engine.
    let mut rig = Rig::new(SessionOptions::default());
    rig.engine.set_state(SessionState::Previewing);
    let gate = rig.engine.gate_state_queries();
    let bridge = rig.session.bridge();

    let first = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.refresh_state().await }
    });
    settle().await;
    let second = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.refresh_state().await }
    });
    let third = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.refresh_state().await }
    });
    settle().await;

    // Act: the engine moves on, then every held query is released.
    rig.engine.set_state(SessionState::Scanning);
    gate.add_permits(2);
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    let third = third.await.unwrap().unwrap();

    // Assert
    assert_eq!(first, None, "in-flight query was superseded");
    assert_eq!(second, None, "waiting query was never issued");
    assert_eq!(third, Some(SessionState::Scanning));
    assert_eq!(rig.count_calls(|c| *c == EngineCall::CurrentState), 2);
    assert_eq!(
        rig.take_notifications(),
        vec![Notification::StateChanged(SessionState::Scanning)]
    );
}

/// Lets spawned tasks run until they block.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

//! Poll channel against a fake device over real HTTP.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use common::{wait_until, FakeDevice};
use microbox_core::updater::RecordingView;
use microbox_core::ElementUpdater;
use microbox_link::collaborators::{NoOpNotifier, RecordingDiagnostics};
use microbox_link::{ChannelRegistry, ChannelStatus, PollChannel, Source};

fn poll_channel(device: &FakeDevice, diagnostics: Arc<RecordingDiagnostics>) -> PollChannel {
    PollChannel::new(
        reqwest::Client::new(),
        device.config().poll_url().unwrap(),
        diagnostics,
    )
}

#[tokio::test]
async fn test_poll_delivers_full_snapshot() {
    let device = FakeDevice::start().await;
    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let channel = poll_channel(&device, diagnostics.clone());
    let (tx, mut rx) = mpsc::channel(8);

    assert!(channel.start(Duration::from_millis(100), tx));

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    channel.stop().await;

    assert_eq!(delivery.source, Source::Poll);
    let metrics = delivery.snapshot.server_metrics.unwrap();
    assert_eq!(metrics.temperature.unwrap().as_str(), "24.5");
    assert_eq!(metrics.humidity.unwrap().as_str(), "60");
    assert_eq!(metrics.watering_active, Some(true));
    assert_eq!(delivery.snapshot.relay_states.len(), 1);
    assert_eq!(diagnostics.error_count(), 0);
    assert_eq!(channel.status().await, ChannelStatus::Idle);
}

#[tokio::test]
async fn test_hung_poll_is_superseded_and_next_cycle_delivers() {
    let device = FakeDevice::start().await;
    device.hang_next_polls(1);

    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let channel = poll_channel(&device, diagnostics.clone());
    let (tx, mut rx) = mpsc::channel(8);

    channel.start(Duration::from_millis(100), tx);

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(delivery.snapshot.server_metrics.is_some());

    let stats = channel.stats();
    channel.stop().await;

    assert!(stats.superseded >= 1);
    assert!(stats.delivered >= 1);
    assert!(device.poll_hits() >= 2);
    assert!(diagnostics.warnings().iter().any(|(context, _)| context == "poll"));
}

#[tokio::test]
async fn test_http_error_reports_and_keeps_polling() {
    let device = FakeDevice::start().await;
    device.set_poll_status(500);

    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let channel = poll_channel(&device, diagnostics.clone());
    let (tx, mut rx) = mpsc::channel(8);

    channel.start(Duration::from_millis(50), tx);

    assert!(wait_until(Duration::from_secs(5), || diagnostics.error_count() >= 2).await);
    assert!(rx.try_recv().is_err());

    device.set_poll_status(200);
    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
    channel.stop().await;

    assert!(delivery.unwrap().is_some());
    assert!(channel.stats().failures >= 2);
}

#[tokio::test]
async fn test_unparseable_body_is_a_failure_not_a_crash() {
    let device = FakeDevice::start().await;
    device.set_poll_body("<html>not json</html>");

    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let channel = poll_channel(&device, diagnostics.clone());
    let (tx, _rx) = mpsc::channel(8);

    channel.start(Duration::from_millis(50), tx);
    assert!(wait_until(Duration::from_secs(5), || diagnostics.error_count() >= 1).await);
    assert!(channel.is_running());
    channel.stop().await;

    assert_eq!(channel.stats().delivered, 0);
}

#[tokio::test]
async fn test_poll_scenario_renders_dashboard_slots() {
    let device = FakeDevice::start().await;
    // Keep push quiet so only the poll path feeds the view.
    let mut config = device.config();
    config.device.push_path = "/missing".to_string();

    let registry = ChannelRegistry::new(
        config,
        Arc::new(RecordingDiagnostics::default()),
        Arc::new(NoOpNotifier),
    )
    .unwrap();

    let view = Arc::new(RecordingView::accepting_all());
    let core = registry
        .build_core(Arc::new(ElementUpdater::new(view.clone())))
        .unwrap();
    core.start(Duration::from_millis(100));

    assert!(wait_until(Duration::from_secs(5), || view.checked("relay1").is_some()).await);
    core.stop().await;

    assert_eq!(view.text("server-temp").as_deref(), Some("24.5°C"));
    assert_eq!(view.text("server-hum").as_deref(), Some("60%"));
    assert_eq!(view.text("server-soillvl").as_deref(), Some("40%"));
    assert_eq!(view.text("server-WateringState").as_deref(), Some("Watering"));
    assert_eq!(view.checked("relay1"), Some(true));
}

#[tokio::test]
async fn test_unchanged_polls_do_not_rerender() {
    let device = FakeDevice::start().await;
    let mut config = device.config();
    config.device.push_path = "/missing".to_string();

    let registry = ChannelRegistry::new(
        config,
        Arc::new(RecordingDiagnostics::default()),
        Arc::new(NoOpNotifier),
    )
    .unwrap();

    let view = Arc::new(RecordingView::accepting_all());
    let core = registry
        .build_core(Arc::new(ElementUpdater::new(view.clone())))
        .unwrap();
    core.start(Duration::from_millis(50));

    assert!(
        wait_until(Duration::from_secs(5), || registry.poll_channel().stats().delivered >= 3)
            .await
    );
    core.stop().await;

    assert_eq!(view.render_count("server-temp"), 1);
    assert_eq!(view.render_count("relay1"), 1);
}

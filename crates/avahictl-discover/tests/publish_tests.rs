//! Publishing integration tests.

use std::sync::Arc;
use std::time::Duration;

use avahictl_discover::{
    DiscoverConfig, DiscoverError, PublishOutcome, PublishRequest, Publisher, ToolExit,
};
use avahictl_test_utils::{ScriptedLauncher, ScriptedProcess};
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn publisher(launcher: &Arc<ScriptedLauncher>) -> Publisher {
    Publisher::with_launcher(launcher.clone(), DiscoverConfig::default())
}

/// Test that the tool gets the name, type, port and TXT strings in order.
#[tokio::test]
async fn test_publish_launch_args() {
    let (live, _handle) = ScriptedProcess::live();
    let launcher = Arc::new(ScriptedLauncher::new().with_process(live));

    let request = PublishRequest::new("BeagleBoneMusicBox", "_musicbox._tcp", 8070)
        .with_txt(["LivingRoom", "volume=11"]);
    let publication = publisher(&launcher)
        .publish(request)
        .await
        .expect("Publish failed");

    assert_eq!(publication.name(), "BeagleBoneMusicBox");
    let launches = launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].program, "avahi-publish-service");
    assert_eq!(
        launches[0].args,
        vec![
            "--",
            "BeagleBoneMusicBox",
            "_musicbox._tcp",
            "8070",
            "LivingRoom",
            "volume=11"
        ]
    );
}

/// Test that stopping a publication kills the tool.
#[tokio::test]
async fn test_publish_stop_kills_tool() {
    let (live, handle) = ScriptedProcess::live();
    let launcher = Arc::new(ScriptedLauncher::new().with_process(live));

    let publication = publisher(&launcher)
        .publish(PublishRequest::new("box", "_http._tcp", 80))
        .await
        .expect("Publish failed");
    assert!(!handle.was_killed());

    let outcome = timeout(TEST_TIMEOUT, publication.stop())
        .await
        .expect("Stop timed out")
        .expect("Stop failed");
    assert_eq!(outcome, PublishOutcome::Killed);
    assert!(handle.was_killed());
}

/// Test the raw kill channel.
#[tokio::test]
async fn test_publish_kill_signal() {
    let (live, handle) = ScriptedProcess::live();
    let launcher = Arc::new(ScriptedLauncher::new().with_process(live));

    let mut publication = publisher(&launcher)
        .publish(PublishRequest::new("box", "_http._tcp", 80))
        .await
        .expect("Publish failed");
    let kill = publication.kill_signal().expect("Kill signal already taken");
    assert!(publication.kill_signal().is_none());

    kill.send(()).expect("Watcher gone");
    timeout(TEST_TIMEOUT, handle.wait_for_exit())
        .await
        .expect("Tool was not killed");
    assert!(handle.was_killed());

    let outcome = timeout(TEST_TIMEOUT, publication.wait())
        .await
        .expect("Wait timed out")
        .expect("Wait failed");
    assert_eq!(outcome, PublishOutcome::Killed);
}

/// Test that a tool exiting on its own is noticed.
#[tokio::test]
async fn test_publish_tool_exits() {
    let (live, handle) = ScriptedProcess::live();
    let launcher = Arc::new(ScriptedLauncher::new().with_process(live));

    let publication = publisher(&launcher)
        .publish(PublishRequest::new("box", "_http._tcp", 80))
        .await
        .expect("Publish failed");

    handle.exit(1);

    let outcome = timeout(TEST_TIMEOUT, publication.wait())
        .await
        .expect("Wait timed out")
        .expect("Wait failed");
    assert_eq!(outcome, PublishOutcome::Exited(ToolExit::code(1)));
    assert!(!handle.was_killed());
}

/// Test that dropping the publication kills the tool.
#[tokio::test]
async fn test_publish_drop_kills_tool() {
    let (live, handle) = ScriptedProcess::live();
    let launcher = Arc::new(ScriptedLauncher::new().with_process(live));

    let publication = publisher(&launcher)
        .publish(PublishRequest::new("box", "_http._tcp", 80))
        .await
        .expect("Publish failed");
    drop(publication);

    timeout(TEST_TIMEOUT, handle.wait_for_exit())
        .await
        .expect("Tool was not killed");
    assert!(handle.was_killed());
}

/// Test that tool output does not block the publication.
#[tokio::test]
async fn test_publish_drains_output() {
    let (live, handle) = ScriptedProcess::live();
    let launcher = Arc::new(ScriptedLauncher::new().with_process(live));

    let publication = publisher(&launcher)
        .publish(PublishRequest::new("box", "_http._tcp", 80))
        .await
        .expect("Publish failed");

    for i in 0..1000 {
        assert!(handle.send_line(&format!("Established under name 'box #{i}'")).await);
    }

    assert!(!publication.is_finished());
    assert_eq!(publication.stop().await.unwrap(), PublishOutcome::Killed);
}

/// Test that a missing tool is returned as an error.
#[tokio::test]
async fn test_publish_launch_failure() {
    let launcher = Arc::new(ScriptedLauncher::new());

    let result = publisher(&launcher)
        .publish(PublishRequest::new("box", "_http._tcp", 80))
        .await;

    assert!(matches!(result, Err(DiscoverError::Spawn { .. })));
}

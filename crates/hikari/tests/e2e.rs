//! E2E regression test suite for Hikari
//!
//! Runs a full agent (listener, pipeline, ban intake, sweeper) with a
//! scripted camera and a manual clock, so every timestamp is exact:
//!
//! - peer → MemoryChannel → listener → pipeline → photo / notice
//! - admin HTTP → ban intake → cooldown store (real loopback socket)
//! - fake message server → TCP → agent → photo frame on the wire
//!
//! Run: `cargo test -p hikari --test e2e`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

use hikari::transport::codec::{read_wire_frame, write_wire_frame};
use hikari::{
    memory_channel, AgentSettings, Camera, CameraAgent, CooldownRecord, Envelope, Identity,
    ManualClock, MemoryPeer, Performative, PipelineOutcome, TcpChannel, WireFrame,
    CANCELLED_NOTICE,
};

const WAIT: Duration = Duration::from_secs(3);

// ── Shared helpers ───────────────────────────────────────────────────

/// Camera whose captures finish only when the test releases them
struct GatedCamera {
    started: mpsc::UnboundedSender<()>,
    release: Mutex<mpsc::UnboundedReceiver<Result<Bytes>>>,
}

#[async_trait]
impl Camera for GatedCamera {
    async fn capture_still(&self) -> Result<Bytes> {
        let _ = self.started.send(());
        let mut release = self.release.lock().await;
        release
            .recv()
            .await
            .unwrap_or_else(|| Err(anyhow::anyhow!("camera control dropped")))
    }
}

struct CameraControl {
    started: mpsc::UnboundedReceiver<()>,
    release: mpsc::UnboundedSender<Result<Bytes>>,
}

impl CameraControl {
    fn finish(&self, image: &'static [u8]) {
        self.release.send(Ok(Bytes::from_static(image))).unwrap();
    }

    fn fail(&self) {
        self.release.send(Err(anyhow::anyhow!("sensor unplugged"))).unwrap();
    }

    async fn wait_started(&mut self) {
        tokio::time::timeout(WAIT, self.started.recv())
            .await
            .expect("capture never started")
            .expect("camera dropped");
    }

    fn captures_started(&mut self) -> usize {
        let mut n = 0;
        while self.started.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

fn gated_camera() -> (GatedCamera, CameraControl) {
    let (started_tx, started_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = mpsc::unbounded_channel();
    (
        GatedCamera {
            started: started_tx,
            release: Mutex::new(release_rx),
        },
        CameraControl {
            started: started_rx,
            release: release_tx,
        },
    )
}

fn test_settings() -> AgentSettings {
    AgentSettings {
        receive_timeout: Duration::from_millis(50),
        ban_gate_timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(1),
        ..Default::default()
    }
}

fn id(raw: &str) -> Identity {
    Identity::parse(raw).unwrap()
}

struct Rig {
    agent: CameraAgent,
    peer: MemoryPeer,
    camera: CameraControl,
    clock: ManualClock,
}

/// Started agent on an in-memory channel
fn start_rig() -> Rig {
    let (channel, peer) = memory_channel(id("camera_agent@localhost"), 32);
    let (camera, control) = gated_camera();
    let clock = ManualClock::new(0);
    let agent = CameraAgent::new(
        Arc::new(channel),
        Arc::new(camera),
        Arc::new(clock.clone()),
        test_settings(),
    );
    agent.start();
    Rig {
        agent,
        peer,
        camera: control,
        clock,
    }
}

async fn next_sent(peer: &mut MemoryPeer) -> Envelope {
    peer.next_sent(WAIT).await.expect("agent sent nothing")
}

async fn start_admin(agent: &CameraAgent) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(hikari::web::serve(agent.clone(), listener));
    addr
}

// ── Message path ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn photo_then_throttled_repeat() {
    let mut rig = start_rig();

    // t=0: first request, no record
    rig.peer.request_photo("alice@chat/phone").await.unwrap();
    rig.camera.wait_started().await;
    rig.camera.finish(b"\xFF\xD8jpeg\xFF\xD9");

    let photo = next_sent(&mut rig.peer).await;
    assert_eq!(photo.from, "camera_agent@localhost");
    assert_eq!(photo.to, "alice@chat");
    assert_eq!(photo.performative, Some(Performative::Inform));
    assert_eq!(photo.body, hikari::encode_still(b"\xFF\xD8jpeg\xFF\xD9"));
    assert_eq!(
        rig.agent.store().get(&id("alice@chat")),
        Some(CooldownRecord::new(0, 500))
    );

    // t=100: same peer from another resource, still cooling down
    rig.clock.set(100);
    rig.peer.request_photo("alice@chat/laptop").await.unwrap();

    let notice = next_sent(&mut rig.peer).await;
    assert_eq!(notice.to, "alice@chat");
    assert_eq!(notice.performative, Some(Performative::Info));
    assert_eq!(notice.body, CANCELLED_NOTICE);
    assert_eq!(rig.camera.captures_started(), 0, "throttled request must not capture");

    let stats = rig.agent.stats();
    assert_eq!(stats.requests_received, 2);
    assert_eq!(stats.photos_sent, 1);
    assert_eq!(stats.requests_throttled, 1);
    assert!(!rig.agent.gate().is_busy());

    eprintln!("PASS: photo sent, repeat within cooldown throttled without capture");
    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cooldown_boundary_is_exact() {
    let rig = start_rig();
    let alice = id("alice@chat");

    rig.clock.set(7_000);
    let run = {
        let agent = rig.agent.clone();
        let alice = alice.clone();
        tokio::spawn(async move { agent.request_photo(&alice).await })
    };
    rig.camera.finish(b"x");
    assert_eq!(run.await.unwrap(), PipelineOutcome::Sent { bytes: 1 });

    assert!(!rig.agent.store().is_elapsed(&alice, 7_499));
    assert!(rig.agent.store().is_elapsed(&alice, 7_500));

    rig.clock.set(7_499);
    assert_eq!(rig.agent.request_photo(&alice).await, PipelineOutcome::Throttled);

    rig.clock.set(7_500);
    rig.camera.finish(b"y");
    assert_eq!(
        rig.agent.request_photo(&alice).await,
        PipelineOutcome::Sent { bytes: 1 }
    );

    eprintln!("PASS: cooldown ends exactly at last + duration");
    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn ban_mid_capture_suppresses_photo() {
    let mut rig = start_rig();

    // t=0: capture begins after the first check passes
    rig.peer.request_photo("alice@chat").await.unwrap();
    rig.camera.wait_started().await;

    // t=1: ban arrives over the message channel while capturing
    rig.clock.set(1);
    rig.peer.ban("admin@chat/console", "alice@chat/phone").await.unwrap();
    let confirm = next_sent(&mut rig.peer).await;
    assert_eq!(confirm.to, "admin@chat");
    assert_eq!(confirm.performative, Some(Performative::Confirm));
    assert_eq!(confirm.body, "Agent alice@chat has been banned");

    // t=2: capture completes, re-check sees the ban
    rig.clock.set(2_000);
    rig.camera.finish(b"photo");
    let notice = next_sent(&mut rig.peer).await;
    assert_eq!(notice.to, "alice@chat");
    assert_eq!(notice.performative, Some(Performative::Info));
    assert!(rig.peer.next_sent(Duration::from_millis(100)).await.is_none());

    // The ban survives the run, and dominates the whole window
    assert_eq!(
        rig.agent.store().get(&id("alice@chat")),
        Some(CooldownRecord::new(1, 10_000))
    );
    for t in [1, 5_000, 10_000] {
        rig.clock.set(t);
        assert_eq!(
            rig.agent.request_photo(&id("alice@chat")).await,
            PipelineOutcome::Throttled,
            "t={t}"
        );
    }
    rig.clock.set(10_001);
    rig.camera.finish(b"again");
    assert_eq!(
        rig.agent.request_photo(&id("alice@chat")).await,
        PipelineOutcome::Sent { bytes: 5 }
    );

    assert_eq!(rig.agent.stats().cancelled_mid_capture, 1);
    eprintln!("PASS: ban applied mid-capture cancels delivery and holds for its duration");
    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn identities_do_not_interfere() {
    let mut rig = start_rig();

    rig.peer.request_photo("alice@chat").await.unwrap();
    rig.camera.wait_started().await;

    rig.agent.ban("bob@chat").await.unwrap();
    assert!(rig.agent.store().get(&id("alice@chat")).is_none());

    rig.camera.finish(b"alice");
    let photo = next_sent(&mut rig.peer).await;
    assert_eq!(photo.to, "alice@chat");
    assert_eq!(photo.performative, Some(Performative::Inform));

    assert_eq!(
        rig.agent.store().get(&id("bob@chat")),
        Some(CooldownRecord::new(0, 10_000))
    );
    assert_eq!(
        rig.agent.store().get(&id("alice@chat")),
        Some(CooldownRecord::new(0, 500))
    );

    eprintln!("PASS: ban on one identity leaves others alone");
    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn request_burst_costs_one_capture() {
    let mut rig = start_rig();

    for _ in 0..10 {
        rig.peer.request_photo("alice@chat/phone").await.unwrap();
    }
    rig.camera.wait_started().await;
    rig.camera.finish(b"alice");

    let mut photos = 0;
    let mut notices = 0;
    for _ in 0..10 {
        match next_sent(&mut rig.peer).await.performative {
            Some(Performative::Inform) => photos += 1,
            Some(Performative::Info) => notices += 1,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!((photos, notices), (1, 9));
    assert_eq!(rig.camera.captures_started(), 0, "burst must not queue captures");

    let stats = rig.agent.stats();
    assert_eq!(stats.requests_throttled, 9);
    assert_eq!(stats.cancelled_mid_capture, 0);

    // The next requester is not stuck behind the burst
    rig.peer.request_photo("bob@chat").await.unwrap();
    rig.camera.wait_started().await;
    rig.camera.finish(b"bob");
    let photo = next_sent(&mut rig.peer).await;
    assert_eq!(photo.to, "bob@chat");
    assert_eq!(photo.performative, Some(Performative::Inform));

    eprintln!("PASS: a burst from one requester captures once");
    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn gate_is_idle_after_every_outcome() {
    let mut rig = start_rig();
    let alice = id("alice@chat");

    // Capture failure
    rig.camera.fail();
    assert_eq!(rig.agent.request_photo(&alice).await, PipelineOutcome::CaptureFailed);
    assert!(!rig.agent.gate().is_busy());
    assert!(rig.peer.try_next_sent().is_none());

    // Success
    rig.camera.finish(b"ok");
    assert_eq!(rig.agent.request_photo(&alice).await, PipelineOutcome::Sent { bytes: 2 });
    assert!(!rig.agent.gate().is_busy());

    // Throttled
    assert_eq!(rig.agent.request_photo(&alice).await, PipelineOutcome::Throttled);
    assert!(!rig.agent.gate().is_busy());

    // Cancelled mid-capture
    rig.clock.set(1_000);
    rig.camera.captures_started();
    let run = {
        let agent = rig.agent.clone();
        let alice = alice.clone();
        tokio::spawn(async move { agent.request_photo(&alice).await })
    };
    rig.camera.wait_started().await;
    rig.agent.ban("alice@chat").await.unwrap();
    rig.camera.finish(b"late");
    assert_eq!(run.await.unwrap(), PipelineOutcome::CancelledMidCapture);
    assert!(!rig.agent.gate().is_busy());

    // A ban right after all that gets the gate straight away
    tokio::time::timeout(Duration::from_millis(200), rig.agent.ban("carol@chat"))
        .await
        .expect("gate left busy")
        .unwrap();

    eprintln!("PASS: gate released on every path");
    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_channel_takes_agent_offline() {
    let mut rig = start_rig();
    rig.peer.close();

    let deadline = tokio::time::Instant::now() + WAIT;
    while rig.agent.is_alive() {
        assert!(tokio::time::Instant::now() < deadline, "listener never stopped");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!rig.agent.status().online);

    // Bans still work until stop
    rig.agent.ban("alice@chat").await.unwrap();
    rig.agent.stop().await;
    assert!(rig.agent.ban("bob@chat").await.is_err());
}

// ── Admin endpoint ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn admin_ban_success() {
    let rig = start_rig();
    let addr = start_admin(&rig.agent).await;
    rig.clock.set(1_000);

    let resp = reqwest::Client::new()
        .post(format!("http://{}/ban", addr))
        .json(&json!({ "agent": "alice@chat" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["ban_timeout"], 10_000);
    assert_eq!(body["message"], "Agent alice@chat has been banned");

    assert_eq!(
        rig.agent.store().get(&id("alice@chat")),
        Some(CooldownRecord::new(1_000, 10_000))
    );

    eprintln!("PASS: admin ban writes (1000, 10000)");
    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_ban_without_agent_is_rejected() {
    let rig = start_rig();
    let addr = start_admin(&rig.agent).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/ban", addr))
        .json(&json!({ "duration": 5 }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("agent"));
    assert!(rig.agent.store().is_empty());

    rig.agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_status_tracks_agent() {
    let mut rig = start_rig();
    let addr = start_admin(&rig.agent).await;

    rig.peer.request_photo("alice@chat").await.unwrap();
    rig.camera.wait_started().await;
    rig.camera.finish(b"hi");
    next_sent(&mut rig.peer).await;
    rig.agent.ban("bob@chat").await.unwrap();

    let body: serde_json::Value = reqwest::get(format!("http://{}/status", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "online");
    assert_eq!(body["agent"], "camera_agent@localhost");
    assert_eq!(body["tracked_identities"], 2);
    assert_eq!(body["gate_busy"], false);
    assert_eq!(body["stats"]["photos_sent"], 1);
    assert_eq!(body["stats"]["bans_applied"], 1);

    rig.agent.stop().await;
}

// ── TCP transport ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn photo_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let login = read_wire_frame(&mut sock).await.unwrap();
        assert!(matches!(login, WireFrame::Login { .. }));
        write_wire_frame(
            &mut sock,
            &WireFrame::LoginAck {
                accepted: true,
                reason: None,
            },
        )
        .await
        .unwrap();

        let request = WireFrame::Message(Envelope {
            from: "alice@chat/phone".into(),
            to: "camera_agent@localhost".into(),
            performative: None,
            body: String::new(),
        });
        write_wire_frame(&mut sock, &request).await.unwrap();

        match tokio::time::timeout(WAIT, read_wire_frame(&mut sock))
            .await
            .unwrap()
            .unwrap()
        {
            WireFrame::Message(env) => env,
            other => panic!("Expected message, got {:?}", other),
        }
    });

    let channel = TcpChannel::connect(&addr, id("camera_agent@localhost"), "top_secret".into())
        .await
        .unwrap();
    let (camera, mut control) = gated_camera();
    let agent = CameraAgent::new(
        Arc::new(channel),
        Arc::new(camera),
        Arc::new(ManualClock::new(0)),
        test_settings(),
    );
    agent.start();

    control.wait_started().await;
    control.finish(b"tcp-photo");

    let photo = server.await.unwrap();
    assert_eq!(photo.from, "camera_agent@localhost");
    assert_eq!(photo.to, "alice@chat");
    assert_eq!(photo.performative, Some(Performative::Inform));
    assert_eq!(photo.body, hikari::encode_still(b"tcp-photo"));

    eprintln!("PASS: request and photo round trip over TCP");
    agent.stop().await;
}

//! End-to-end crawls against in-process Levin responders
//!
//! Each responder accepts connections on 127.0.0.1, reads the handshake
//! request and answers with a canned reply.

use p2p_scan::levin::{self, BucketHeader, PeerRecord, Section, Value, HEADER_SIZE};
use p2p_scan::{
    CheckpointStore, CrawlConfig, CrawlEnd, Crawler, FrontierState, NodeIdentity, NodeProber,
    ProberConfig, SaveOutcome,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Responder {
    node: NodeIdentity,
    hits: Arc<AtomicUsize>,
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn serve(listener: TcpListener, port: u16, reply: Vec<u8>) -> Responder {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let reply = reply.clone();
            tokio::spawn(async move {
                let mut header = [0u8; HEADER_SIZE];
                if socket.read_exact(&mut header).await.is_err() {
                    return;
                }
                let Ok(header) = BucketHeader::from_bytes(&header) else {
                    return;
                };
                let mut body = vec![0u8; header.body_size as usize];
                if socket.read_exact(&mut body).await.is_err() {
                    return;
                }
                let _ = socket.write_all(&reply).await;
            });
        }
    });
    Responder {
        node: NodeIdentity::new("127.0.0.1", port),
        hits,
    }
}

fn peer_list(ports: &[u16], extra: Vec<Value>) -> Vec<u8> {
    let mut entries: Vec<Value> = ports
        .iter()
        .map(|port| {
            PeerRecord {
                ip: Ipv4Addr::LOCALHOST.into(),
                port: *port,
                pruning_seed: None,
                rpc_port: None,
            }
            .to_entry()
        })
        .collect();
    entries.extend(extra);
    levin::build_handshake_response(entries).unwrap().to_bytes()
}

async fn dead_port() -> u16 {
    let (listener, port) = bind().await;
    drop(listener);
    port
}

/// a -> {a, b, c, malformed}; b -> {c, d}; c speaks something else; d is closed
struct TestNetwork {
    a: Responder,
    b: Responder,
    c: Responder,
    d: NodeIdentity,
}

async fn test_network() -> TestNetwork {
    let (la, pa) = bind().await;
    let (lb, pb) = bind().await;
    let (lc, pc) = bind().await;
    let pd = dead_port().await;

    let malformed = Value::Section(Section::new().with("id", Value::U64(1)));
    let a = serve(la, pa, peer_list(&[pa, pb, pc], vec![malformed]));
    let b = serve(lb, pb, peer_list(&[pc, pd], vec![]));
    let c = serve(lc, pc, b"SSH-2.0-OpenSSH_9.6\r\n".to_vec());

    TestNetwork {
        a,
        b,
        c,
        d: NodeIdentity::new("127.0.0.1", pd),
    }
}

fn crawler(limit: usize) -> Crawler<NodeProber> {
    let prober = NodeProber::new(ProberConfig {
        io_timeout: Duration::from_secs(2),
        max_body_size: 1 << 20,
    });
    Crawler::new(
        prober,
        CrawlConfig {
            limit,
            probe_deadline: Duration::from_secs(3),
        },
    )
}

#[tokio::test]
async fn test_full_crawl_and_checkpoint() {
    let net = test_network().await;
    let tmp = TempDir::new().unwrap();
    let store = CheckpointStore::new(tmp.path().join("data"));

    let start = store.load(&net.a.node).unwrap();
    assert_eq!(start.to_scan, HashSet::from([net.a.node.clone()]));

    let (state, report) = crawler(100).run(start).await;

    assert_eq!(report.end, CrawlEnd::FrontierExhausted);
    assert_eq!(report.attempts, 4);
    assert_eq!(report.failures, 2);
    assert_eq!(
        state.scanned,
        HashSet::from([net.a.node.clone(), net.b.node.clone(), net.c.node.clone(), net.d.clone()])
    );
    assert_eq!(state.error, HashSet::from([net.c.node.clone(), net.d.clone()]));
    assert_eq!(net.a.hits.load(Ordering::SeqCst), 1);
    assert_eq!(net.c.hits.load(Ordering::SeqCst), 1);

    assert_eq!(store.save(&state).unwrap(), SaveOutcome::Written);

    // nothing left to resume, so the next run restarts at the bootstrap node
    let resumed = store.load(&net.a.node).unwrap();
    assert_eq!(resumed.to_scan, HashSet::from([net.a.node.clone()]));
    assert_eq!(resumed.baseline(), 4);
    assert_eq!(resumed.error.len(), 2);
}

#[tokio::test]
async fn test_budgeted_runs_resume_from_checkpoint() {
    let net = test_network().await;
    let tmp = TempDir::new().unwrap();
    let store = CheckpointStore::new(tmp.path());

    let (first, report) = crawler(1).run(store.load(&net.a.node).unwrap()).await;
    assert_eq!(report.end, CrawlEnd::BudgetExhausted);
    assert_eq!(first.scanned, HashSet::from([net.a.node.clone()]));
    assert_eq!(
        first.not_scanned_yet,
        HashSet::from([net.b.node.clone(), net.c.node.clone()])
    );
    store.save(&first).unwrap();

    let second_start = store.load(&net.a.node).unwrap();
    assert_eq!(second_start.baseline(), 1);
    let (second, report) = crawler(100).run(second_start).await;

    assert_eq!(report.end, CrawlEnd::FrontierExhausted);
    assert_eq!(report.attempts, 3);
    assert_eq!(second.newly_scanned(), 3);
    assert_eq!(second.scanned.len(), 4);
    // the bootstrap node was only ever probed by the first run
    assert_eq!(net.a.hits.load(Ordering::SeqCst), 1);
    assert_eq!(net.b.hits.load(Ordering::SeqCst), 1);
    assert_eq!(store.save(&second).unwrap(), SaveOutcome::Written);
}

#[tokio::test]
async fn test_unreachable_bootstrap_is_recorded() {
    let dead = NodeIdentity::new("127.0.0.1", dead_port().await);
    let tmp = TempDir::new().unwrap();
    let store = CheckpointStore::new(tmp.path());

    let (state, report) = crawler(10).run(FrontierState::seeded(dead.clone())).await;

    assert_eq!(report.attempts, 1);
    assert_eq!(report.failures, 1);
    assert_eq!(state.error, HashSet::from([dead.clone()]));
    assert_eq!(store.save(&state).unwrap(), SaveOutcome::Written);
    assert_eq!(store.read().unwrap().unwrap().scanned, vec![dead]);
}

#[tokio::test]
async fn test_restart_at_scanned_bootstrap_that_fails_is_saved() {
    let bootstrap = NodeIdentity::new("127.0.0.1", dead_port().await);
    let tmp = TempDir::new().unwrap();
    let store = CheckpointStore::new(tmp.path());
    std::fs::write(
        store.path(),
        format!(
            r#"{{"error":[],"scanned":[["127.0.0.1",{},null,null]],"not_scanned_yet":[]}}"#,
            bootstrap.port
        ),
    )
    .unwrap();

    let start = store.load(&bootstrap).unwrap();
    assert_eq!(start.to_scan, HashSet::from([bootstrap.clone()]));
    let (state, report) = crawler(10).run(start).await;

    assert_eq!(report.attempts, 1);
    assert_eq!(report.failures, 1);
    assert_eq!(state.newly_scanned(), 1);
    assert_eq!(store.save(&state).unwrap(), SaveOutcome::Written);

    let saved = store.read().unwrap().unwrap();
    assert_eq!(saved.error, vec![bootstrap.clone()]);
    assert_eq!(saved.scanned, vec![bootstrap]);
    assert!(saved.not_scanned_yet.is_empty());
}

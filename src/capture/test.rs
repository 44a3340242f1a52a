use std::collections::VecDeque;
use std::io::{self, Cursor, ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use anyhow::Result;
use tokio::time::timeout;
use crate::Error;
use crate::engine::Engine;
use crate::engine::fake::{corrupt, heartbeat, record, Fake};
use super::*;

fn config(endpoint: Endpoint) -> Config {
    Config {
        endpoint:        endpoint,
        connect_timeout: Duration::from_millis(300),
        ..Default::default()
    }
}

#[test]
fn frame_round_trip() -> Result<()> {
    let mut rec = record(7, "TCP", "10.0.0.1", "10.0.0.2", 443);
    rec.timestamp = Timestamp { sec: 1_600_000_000, usec: 250 };

    let buf = encode(&rec);
    assert_eq!(FRAME_LEN, buf.len());
    assert_eq!(rec, decode(&buf)?);

    Ok(())
}

#[test]
fn frame_wrong_size() -> Result<()> {
    let buf = encode(&record(1, "UDP", "a", "b", 53));

    assert_eq!(Err(DecodeError::IncompleteFrame(0)), decode(&[]));
    assert_eq!(Err(DecodeError::IncompleteFrame(FRAME_LEN - 1)), decode(&buf[..FRAME_LEN - 1]));

    let mut long = buf.clone();
    long.push(0);
    assert_eq!(Err(DecodeError::UnexpectedSize(FRAME_LEN + 1)), decode(&long));

    Ok(())
}

#[test]
fn frame_bad_fields() -> Result<()> {
    let mut buf = encode(&record(1, "UDP", "a", "b", 53));
    buf[144..148].copy_from_slice(&70_000u32.to_le_bytes());
    assert_eq!(Err(DecodeError::CaptureLength(70_000)), decode(&buf));

    let mut buf = encode(&record(1, "UDP", "a", "b", 53));
    buf[4..8].copy_from_slice(&(-1i32).to_le_bytes());
    assert_eq!(Err(DecodeError::PortRange(-1)), decode(&buf));

    Ok(())
}

#[test]
fn frame_text_padding() -> Result<()> {
    let mut buf = encode(&record(1, "x", "a", "b", 53));
    buf[12..34].copy_from_slice(b"TCP                   ");
    assert_eq!("TCP", decode(&buf)?.protocol);

    let long = "fe80::1234:5678:9abc:def0";
    let rec  = decode(&encode(&record(1, "TCP", long, "b", 80)))?;
    assert_eq!(&long[..21], rec.src_ip);

    Ok(())
}

#[test]
fn frames_save_load() -> Result<()> {
    let recs = vec![
        record(1, "TCP", "10.0.0.1", "10.0.0.2", 80),
        record(2, "UDP", "10.0.0.3", "10.0.0.4", 53),
    ];

    let mut buf = Vec::new();
    assert_eq!(2, save(&mut buf, &recs[..])?);
    assert_eq!(2 * FRAME_LEN, buf.len());
    assert_eq!(recs, load(Cursor::new(&buf))?);

    buf.truncate(FRAME_LEN + 10);
    assert!(load(Cursor::new(&buf)).is_err());

    Ok(())
}

#[test]
fn queue_drops_oldest() -> Result<()> {
    let tx = queue::channel(4, 100);
    let rx = tx.subscribe();

    for n in 0..5 {
        tx.send(n)?;
    }

    assert_eq!(vec![1, 2, 3, 4], rx.try_batch());
    assert_eq!(1, rx.dropped());

    Ok(())
}

#[test]
fn queue_batch_ceiling() -> Result<()> {
    let tx = queue::channel(1_000, 100);
    let rx = tx.subscribe();

    for n in 0..250 {
        tx.send(n)?;
    }

    assert_eq!(100, rx.try_batch().len());
    assert_eq!(100, rx.try_batch().len());
    assert_eq!(50,  rx.try_batch().len());
    assert!(rx.is_empty());

    Ok(())
}

#[test]
fn queue_fan_out() -> Result<()> {
    let tx = queue::channel(10, 10);
    let a  = tx.subscribe();
    let b  = tx.subscribe();

    tx.send("x")?;
    drop(b);
    tx.send("y")?;

    assert_eq!(vec!["x", "y"], a.try_batch());

    tx.close();
    assert!(matches!(tx.send("z"), Err(Error::Closed)));
    assert!(tx.subscribe().is_closed());

    Ok(())
}

#[tokio::test]
async fn queue_close_wakes() -> Result<()> {
    let tx = queue::channel::<u32>(10, 10);
    let rx = tx.subscribe();

    let waiter = tokio::spawn(async move {
        rx.recv_batch().await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.close();

    assert_eq!(None, timeout(Duration::from_secs(1), waiter).await??);

    Ok(())
}

#[tokio::test]
async fn queue_drains_after_close() -> Result<()> {
    let tx = queue::channel(10, 2);
    let rx = tx.subscribe();

    tx.send(1)?;
    tx.send(2)?;
    tx.send(3)?;
    tx.close();

    assert_eq!(Some(vec![1, 2]), rx.recv_batch().await);
    assert_eq!(Some(3), rx.recv().await);
    assert_eq!(None, rx.recv_batch().await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn bridge_drops_heartbeat() -> Result<()> {
    let recs = [heartbeat(), record(1, "TCP", "10.0.0.1", "10.0.0.2", 80)];
    let fake = Arc::new(Fake::new(&recs)?);
    let cfg  = Arc::new(config(fake.endpoint.clone()));

    let engine: Arc<dyn Engine> = fake.clone();
    let mut bridge = Bridge::new(cfg, engine, fake.signal.clone());

    let tx = queue::channel(10, 10);
    let rx = tx.subscribe();

    bridge.start(0, tx.clone())?;
    bridge.start(0, tx.clone())?;
    assert!(bridge.is_active());
    assert!(fake.signal.is_set());

    let batch = timeout(Duration::from_secs(5), rx.recv_batch()).await?;
    let batch = batch.unwrap_or_default();
    assert_eq!(1, batch.len());
    assert_eq!(recs[1], *batch[0]);

    bridge.stop()?;
    tx.close();

    assert_eq!(None, rx.recv_batch().await);
    assert_eq!(1, fake.starts.load(Ordering::SeqCst));
    assert_eq!(1, fake.accepts.load(Ordering::SeqCst));
    assert!(!fake.signal.is_set());
    assert!(!bridge.is_active());

    Ok(())
}

#[test]
fn bridge_connect_timeout() -> Result<()> {
    let fake = Arc::new(Fake::dead()?);
    let cfg  = Arc::new(config(fake.endpoint.clone()));

    let engine: Arc<dyn Engine> = fake.clone();
    let mut bridge = Bridge::new(cfg, engine, fake.signal.clone());

    let result = bridge.start(0, queue::channel(10, 10));
    assert!(matches!(result, Err(Error::ConnectTimeout(_))));
    assert!(result.map_err(|e| e.retryable()).unwrap_err());
    assert!(!bridge.is_active());
    assert!(!fake.signal.is_set());
    assert_eq!(1, fake.stops.load(Ordering::SeqCst));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn bridge_reader_hangup() -> Result<()> {
    let fake = Fake::new(&[record(1, "TCP", "10.0.0.1", "10.0.0.2", 80)])?
        .frame(corrupt(2))
        .frame(encode(&record(3, "UDP", "10.0.0.3", "10.0.0.4", 53)))
        .hangup();
    let fake = Arc::new(fake);
    let cfg  = Arc::new(config(fake.endpoint.clone()));

    let engine: Arc<dyn Engine> = fake.clone();
    let mut bridge = Bridge::new(cfg, engine, fake.signal.clone());

    let tx = queue::channel(10, 10);
    let rx = tx.subscribe();

    bridge.start(0, tx.clone())?;

    let mut ids = Vec::new();
    while let Some(batch) = timeout(Duration::from_secs(5), rx.recv_batch()).await? {
        ids.extend(batch.iter().map(|rec| rec.id));
    }

    assert_eq!(vec![1, 3], ids);
    assert!(tx.is_closed());

    let deadline = Instant::now() + Duration::from_secs(5);
    while bridge.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    assert!(!bridge.is_running());
    assert!(bridge.is_active());

    bridge.start(0, queue::channel(10, 10))?;
    assert_eq!(2, fake.starts.load(Ordering::SeqCst));
    assert_eq!(1, fake.stops.load(Ordering::SeqCst));
    assert!(bridge.is_active());

    bridge.stop()?;
    assert_eq!(2, fake.stops.load(Ordering::SeqCst));

    Ok(())
}

struct Flaky {
    chunks: VecDeque<io::Result<Vec<u8>>>,
}

impl Read for Flaky {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.chunks.pop_front() {
            Some(Ok(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.chunks.push_front(Ok(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None         => Ok(0),
        }
    }
}

#[test]
fn reader_skips_failures() -> Result<()> {
    let second = encode(&record(2, "TCP", "10.0.0.1", "10.0.0.2", 80));
    let (head, tail) = second.split_at(1000);

    let chunks = vec![
        Ok(encode(&record(1, "TCP", "10.0.0.1", "10.0.0.2", 80))),
        Err(io::Error::new(ErrorKind::TimedOut, "stalled")),
        Ok(head.to_vec()),
        Err(io::Error::new(ErrorKind::WouldBlock, "stalled")),
        Ok(tail.to_vec()),
        Ok(corrupt(3)),
        Ok(encode(&heartbeat())),
        Ok(encode(&record(4, "UDP", "10.0.0.3", "10.0.0.4", 53))),
        Err(io::Error::new(ErrorKind::ConnectionReset, "reset")),
        Ok(encode(&record(5, "UDP", "10.0.0.3", "10.0.0.4", 53))),
    ];

    let tx    = queue::channel(10, 10);
    let rx    = tx.subscribe();
    let stop  = Arc::new(AtomicBool::new(false));
    let pause = Duration::from_millis(1);

    let mut task = bridge::Task::new(Flaky { chunks: chunks.into() }, tx.clone(), stop, pause);
    task.poll()?;

    assert_eq!(vec![1, 2, 4], rx.try_batch().iter().map(|rec| rec.id).collect::<Vec<_>>());
    assert!(tx.is_closed());
    assert!(rx.is_closed());

    Ok(())
}

fn filter(s: &str) -> Result<Filter> {
    Ok(s.parse()?)
}

#[test]
fn filter_parse() -> Result<()> {
    assert_eq!(Filter::Any,                       filter("")?);
    assert_eq!(Filter::Protocol("tcp".into()),    filter("proto:tcp")?);
    assert_eq!(Filter::SourceIp("10.0".into()),   filter("src:10.0")?);
    assert_eq!(Filter::DestIp("10.1".into()),     filter("dst: 10.1")?);
    assert_eq!(Filter::SourcePort(22),            filter("sport:22")?);
    assert_eq!(Filter::DestPort(443),             filter("dport:443")?);
    assert_eq!(Filter::Any,                       filter("dport:https")?);
    assert_eq!(Filter::Text("fe80::1".into()),    filter("fe80::1")?);
    Ok(())
}

#[test]
fn filter_matches() -> Result<()> {
    let rec = record(1, "TCP", "192.168.1.10", "10.0.0.2", 443);

    assert!(Filter::Any.matches(&rec));
    assert!(filter("proto:tc")?.matches(&rec));
    assert!(filter("src:192.168")?.matches(&rec));
    assert!(!filter("dst:192.168")?.matches(&rec));
    assert!(filter("dport:443")?.matches(&rec));
    assert!(!filter("sport:443")?.matches(&rec));
    assert!(filter("tcp")?.matches(&rec));
    assert!(filter("44")?.matches(&rec));
    assert!(!filter("udp")?.matches(&rec));

    Ok(())
}

#[test]
fn signals() -> Result<()> {
    let event = Event::new();
    assert!(!event.wait(Duration::from_millis(10)));
    event.set()?;
    event.set()?;
    assert!(event.wait(Duration::from_millis(10)));
    event.reset()?;
    assert!(!event.is_set());

    let dir   = std::env::temp_dir().join(format!("tapline-{}", std::process::id()));
    let named = Named::new(&dir, "capture/signal");
    assert_eq!(dir.join("capture_signal"), named.path());

    named.set()?;
    assert!(named.is_set());
    named.reset()?;
    named.reset()?;
    assert!(!named.is_set());

    std::fs::remove_dir_all(&dir)?;

    Ok(())
}

#[test]
fn endpoint_parse() -> Result<()> {
    let tcp: Endpoint = "tcp://127.0.0.1:9000".parse().map_err(anyhow::Error::msg)?;
    assert_eq!(Endpoint::Tcp("127.0.0.1:9000".parse()?), tcp);

    let unix: Endpoint = "unix:///run/tapline.sock".parse().map_err(anyhow::Error::msg)?;
    assert_eq!(Endpoint::Unix("/run/tapline.sock".into()), unix);

    assert!("tcp://nope".parse::<Endpoint>().is_err());

    Ok(())
}

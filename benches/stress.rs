use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ulid::Ulid;

use innkeep::engine::{Engine, EngineError};
use innkeep::identity::Caller;
use innkeep::model::{BookingRequest, DateRange, Role};
use innkeep::notify::NotifyHub;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn day_offset(n: i64) -> NaiveDate {
    d(2025, 1, 1) + chrono::Days::new(n as u64)
}

struct Setup {
    engine: Arc<Engine>,
    guest: Caller,
    rooms: Vec<Ulid>,
}

async fn setup() -> Setup {
    let dir = std::env::temp_dir().join(format!("innkeep_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::open(dir.join("bench.wal"), Arc::new(NotifyHub::new())).unwrap());

    let host = engine
        .register_user("Bench Host", "host@bench.local", Role::Host)
        .await
        .unwrap();
    let guest_id = engine
        .register_user("Bench Guest", "guest@bench.local", Role::Guest)
        .await
        .unwrap();
    let acc = engine
        .create_accommodation(host, "Bench Hotel", "Benchville")
        .await
        .unwrap();

    let mut rooms = Vec::new();
    for i in 0..20 {
        rooms.push(
            engine
                .create_room(acc, "double", 2, 1, 80.0 + i as f64)
                .await
                .unwrap(),
        );
    }
    println!("  created {} rooms", rooms.len());

    Setup {
        engine,
        guest: Caller::new(guest_id, Role::Guest),
        rooms,
    }
}

/// Single-night stays, back to back on one room — every attempt succeeds.
async fn phase1_sequential(s: &Setup) {
    let room = s.rooms[0];
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let checkin = day_offset(i as i64 % 360);
        let room = if i < 360 { room } else { s.rooms[1 + (i / 360)] };
        let t = Instant::now();
        s.engine
            .create_booking(
                &s.guest,
                BookingRequest {
                    room_id: room,
                    start_date: checkin,
                    end_date: checkin + chrono::Days::new(1),
                    guests: 1,
                },
            )
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Ten tasks booking disjoint rooms concurrently — group commit batches
/// their WAL appends.
async fn phase2_concurrent(s: &Setup) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..n_tasks {
        let engine = s.engine.clone();
        let guest = s.guest;
        let room = s.rooms[8 + t];

        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let checkin = day_offset(j as i64);
                engine
                    .create_booking(
                        &guest,
                        BookingRequest {
                            room_id: room,
                            start_date: checkin,
                            end_date: checkin + chrono::Days::new(1),
                            guests: 1,
                        },
                    )
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Everyone fights for the same week of the same room.
async fn phase3_contention(s: &Setup) {
    let engine = s.engine.clone();
    let acc = engine.room_info(&s.rooms[0]).await.unwrap().accommodation_id;
    let room = engine.create_room(acc, "contended", 2, 1, 100.0).await.unwrap();

    let n_tasks = 50;
    let wins = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let engine = engine.clone();
        let guest = s.guest;
        let wins = wins.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            let result = engine
                .create_booking(
                    &guest,
                    BookingRequest {
                        room_id: room,
                        start_date: d(2026, 7, 1),
                        end_date: d(2026, 7, 8),
                        guests: 2,
                    },
                )
                .await;
            match result {
                Ok(_) => {
                    wins.fetch_add(1, Ordering::Relaxed);
                }
                Err(EngineError::DateRangeUnavailable { .. }) => {
                    conflicts.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => panic!("unexpected: {e}"),
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    println!(
        "  {n_tasks} rivals for one week: {} won, {} rejected in {:.2}s",
        wins.load(Ordering::Relaxed),
        conflicts.load(Ordering::Relaxed),
        elapsed.as_secs_f64()
    );
    assert_eq!(wins.load(Ordering::Relaxed), 1);
}

/// Availability reads while writers keep booking other rooms.
async fn phase4_read_under_load(s: &Setup) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5usize {
        let engine = s.engine.clone();
        let guest = s.guest;
        let room = s.rooms[2 + w];
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 400i64;
            while !stop.load(Ordering::Relaxed) {
                let checkin = day_offset(i % 3000 + 400);
                let _ = engine
                    .create_booking(
                        &guest,
                        BookingRequest {
                            room_id: room,
                            start_date: checkin,
                            end_date: checkin + chrono::Days::new(1),
                            guests: 1,
                        },
                    )
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let window = DateRange::new(d(2025, 1, 1), d(2025, 12, 31));
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = s.engine.clone();
        let room = s.rooms[r % s.rooms.len()];
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                engine.availability_in_range(&room, &window).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

/// WAL rewrite cost with the full booking history in place.
async fn phase5_compaction(s: &Setup) {
    let appends = s.engine.appends_since_compact().await;
    let t = Instant::now();
    s.engine.compact_wal().await.unwrap();
    println!(
        "  compacted {appends} appends in {:.2}ms",
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    println!("=== innkeep stress benchmark ===\n");

    println!("[setup]");
    let s = setup().await;

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential(&s).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(&s).await;

    println!("\n[phase 3] single-range contention");
    phase3_contention(&s).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&s).await;

    println!("\n[phase 5] compaction");
    phase5_compaction(&s).await;

    println!("\n=== benchmark complete ===");
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Duration as Days, Local, NaiveDate};
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

/// Every half hour, all week.
const SLOTS_PER_DAY: usize = 48;

async fn connect(host: &str, port: u16, salon: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(salon)
        .user("agenda")
        .password(std::env::var("AGENDA_PASSWORD").unwrap_or_else(|_| "agenda".into()));

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn fresh_salon() -> String {
    format!("bench_{}", Ulid::new())
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
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
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// The `n`th bookable (date, time) pair from tomorrow on.
fn nth_slot(n: usize) -> (NaiveDate, String) {
    let tomorrow = Local::now().date_naive() + Days::days(1);
    let date = tomorrow + Days::days((n / SLOTS_PER_DAY) as i64);
    let minutes = (n % SLOTS_PER_DAY) * 30;
    (date, format!("{:02}:{:02}", minutes / 60, minutes % 60))
}

struct Salon {
    service: Ulid,
    client: Ulid,
}

/// Open all week on the half hour, with one service and one client.
async fn setup(client: &tokio_postgres::Client) -> Salon {
    let slots: Vec<String> = (0..SLOTS_PER_DAY).map(|i| nth_slot(i).1).collect();
    client
        .batch_execute(&format!(
            "INSERT INTO weekly_availability VALUES ('0,1,2,3,4,5,6', '{}')",
            slots.join(",")
        ))
        .await
        .unwrap();
    let service = Ulid::new();
    client
        .batch_execute(&format!("INSERT INTO services VALUES ('{service}', 'Corte', '45,00')"))
        .await
        .unwrap();
    let customer = Ulid::new();
    client
        .batch_execute(&format!("INSERT INTO clients VALUES ('{customer}', 'Bench')"))
        .await
        .unwrap();
    Salon {
        service,
        client: customer,
    }
}

fn booking_sql(salon: &Salon, n: usize) -> String {
    let (date, time) = nth_slot(n);
    format!(
        "INSERT INTO appointments VALUES ('{}', '{}', '{}', '{date}', '{time}')",
        Ulid::new(),
        salon.client,
        salon.service
    )
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port, &fresh_salon()).await;
    let salon = setup(&client).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        client.batch_execute(&booking_sql(&salon, i)).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(host: &str, port: u16) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            // Each task books into its own salon
            let client = connect(&host, port, &fresh_salon()).await;
            let salon = setup(&client).await;
            for j in 0..n_per_task {
                client.batch_execute(&booking_sql(&salon, j)).await.unwrap();
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

/// Many connections race for the same slots in one salon. Exactly one wins each.
async fn phase3_contention(host: &str, port: u16) {
    let name = fresh_salon();
    let setup_client = connect(host, port, &name).await;
    let salon = Arc::new(setup(&setup_client).await);

    let n_racers = 20;
    let n_slots = 50;
    let wins = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_racers {
        let host = host.to_string();
        let name = name.clone();
        let salon = salon.clone();
        let wins = wins.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &name).await;
            for n in 0..n_slots {
                match client.batch_execute(&booking_sql(&salon, n)).await {
                    Ok(()) => wins.fetch_add(1, Ordering::Relaxed),
                    Err(_) => conflicts.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let won = wins.load(Ordering::Relaxed);
    println!(
        "  {n_racers} racers x {n_slots} slots: {won} booked, {} rejected in {:.2}s",
        conflicts.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, n_slots, "every slot must be booked exactly once");
}

async fn phase4_read_under_load(host: &str, port: u16) {
    let name = fresh_salon();
    let setup_client = connect(host, port, &name).await;
    let salon = Arc::new(setup(&setup_client).await);
    // Pre-fill the first day so slot listings do real work
    for i in 0..SLOTS_PER_DAY / 2 {
        setup_client.batch_execute(&booking_sql(&salon, i)).await.unwrap();
    }
    drop(setup_client);

    // Writers keep booking further out in the same salon
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let host = host.to_string();
        let name = name.clone();
        let salon = salon.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &name).await;
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let n = SLOTS_PER_DAY * (1 + w * 1000 + i);
                let _ = client.batch_execute(&booking_sql(&salon, n)).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    let (day, _) = nth_slot(0);

    for _ in 0..n_readers {
        let host = host.to_string();
        let name = name.clone();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &name).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .simple_query(&format!("SELECT * FROM slots WHERE date = '{day}'"))
                    .await
                    .unwrap();
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

    print_latency("slot listing", &mut all_latencies);
}

async fn phase5_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &fresh_salon()).await;
            let salon = setup(&client).await;
            for i in 0..ops_per_conn {
                client.batch_execute(&booking_sql(&salon, i)).await.unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("AGENDA_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("AGENDA_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid AGENDA_PORT");

    println!("=== agenda stress benchmark ===");
    println!("target: {host}:{port}\n");

    // Each phase uses its own salon (unique dbname) to avoid interference

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(&host, port).await;

    println!("\n[phase 3] same-slot contention");
    phase3_contention(&host, port).await;

    println!("\n[phase 4] slot listing latency under write load");
    phase4_read_under_load(&host, port).await;

    println!("\n[phase 5] connection storm");
    phase5_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}

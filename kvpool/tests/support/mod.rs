//! In-process store server used by the integration tests.
//!
//! Speaks enough RESP2 to exercise the pooled client end to end and records
//! connection/command counters so tests can assert on pool behavior.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default, Clone)]
pub struct MockOptions {
    /// Password clients must AUTH with; `None` accepts unauthenticated use.
    pub password: Option<String>,
    /// Delay before answering AUTH, to hold a creation in flight.
    pub auth_delay: Option<Duration>,
    /// Delay before answering any data command.
    pub command_delay: Option<Duration>,
}

pub struct MockStore {
    pub addr: String,
    inner: Arc<Inner>,
}

struct Inner {
    options: MockOptions,
    accepted: AtomicUsize,
    live: AtomicUsize,
    busy: AtomicUsize,
    max_busy: AtomicUsize,
    data: Mutex<State>,
}

#[derive(Default)]
struct State {
    strings: HashMap<Vec<u8>, (Vec<u8>, Option<Instant>)>,
    hashes: HashMap<Vec<u8>, HashMap<Vec<u8>, Vec<u8>>>,
    lists: HashMap<Vec<u8>, VecDeque<Vec<u8>>>,
}

impl MockStore {
    pub async fn start() -> MockStore {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> MockStore {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let inner = Arc::new(Inner {
            options,
            accepted: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            busy: AtomicUsize::new(0),
            max_busy: AtomicUsize::new(0),
            data: Mutex::new(State::default()),
        });

        let accept_inner = inner.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accept_inner.accepted.fetch_add(1, Ordering::SeqCst);
                accept_inner.live.fetch_add(1, Ordering::SeqCst);
                let conn_inner = accept_inner.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, &conn_inner).await;
                    conn_inner.live.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        MockStore { addr, inner }
    }

    /// Total connections the server has accepted.
    pub fn connections_accepted(&self) -> usize {
        self.inner.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn live_connections(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// High-water mark of commands executing at the same time.
    pub fn max_concurrent_commands(&self) -> usize {
        self.inner.max_busy.load(Ordering::SeqCst)
    }

    /// Pushes a list element directly, bypassing the wire.
    pub fn push_list(&self, key: &[u8], value: &[u8]) {
        let mut data = self.inner.data.lock().expect("state mutex");
        data.lists
            .entry(key.to_vec())
            .or_default()
            .push_back(value.to_vec());
    }

    /// Waits until all server-side connections are gone.
    pub async fn wait_for_no_connections(&self) {
        for _ in 0..200 {
            if self.live_connections() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connections still open after shutdown");
    }
}

async fn handle_connection(stream: TcpStream, inner: &Inner) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(args) = read_command(&mut reader).await? {
        if args.is_empty() {
            write_error(&mut write_half, "empty command").await?;
            continue;
        }

        let cmd = args[0].to_ascii_uppercase();
        if cmd == b"QUIT" {
            write_simple(&mut write_half, "OK").await?;
            break;
        }
        if cmd == b"AUTH" {
            if let Some(delay) = inner.options.auth_delay {
                tokio::time::sleep(delay).await;
            }
            match &inner.options.password {
                Some(expected) if args.len() == 2 && args[1] == expected.as_bytes() => {
                    write_simple(&mut write_half, "OK").await?;
                }
                Some(_) => write_error(&mut write_half, "invalid password").await?,
                None => write_error(&mut write_half, "client sent AUTH, but no password is set").await?,
            }
            continue;
        }

        let busy = inner.busy.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_busy.fetch_max(busy, Ordering::SeqCst);
        if let Some(delay) = inner.options.command_delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = dispatch(&cmd, &args, inner, &mut write_half).await;
        inner.busy.fetch_sub(1, Ordering::SeqCst);
        outcome?;
    }
    Ok(())
}

async fn dispatch(
    cmd: &[u8],
    args: &[Vec<u8>],
    inner: &Inner,
    out: &mut OwnedWriteHalf,
) -> std::io::Result<()> {
    match cmd {
        b"PING" => match args.len() {
            1 => write_simple(out, "PONG").await,
            2 => write_bulk(out, &args[1]).await,
            _ => write_error(out, "wrong number of arguments for PING").await,
        },
        b"ECHO" => write_bulk(out, &args[1]).await,
        b"GET" => {
            let value = {
                let mut data = inner.data.lock().expect("state mutex");
                data.get_string(&args[1])
            };
            match value {
                Some(value) => write_bulk(out, &value).await,
                None => write_null(out).await,
            }
        }
        b"SET" => {
            let deadline = if args.len() == 5 && args[3].eq_ignore_ascii_case(b"EX") {
                match parse_u64(&args[4]) {
                    Some(secs) => Some(Instant::now() + Duration::from_secs(secs)),
                    None => return write_error(out, "invalid expire time").await,
                }
            } else if args.len() == 3 {
                None
            } else {
                return write_error(out, "unsupported SET options").await;
            };
            {
                let mut data = inner.data.lock().expect("state mutex");
                data.strings
                    .insert(args[1].clone(), (args[2].clone(), deadline));
            }
            write_simple(out, "OK").await
        }
        b"DEL" => {
            let mut removed = 0i64;
            {
                let mut data = inner.data.lock().expect("state mutex");
                for key in &args[1..] {
                    if data.strings.remove(key).is_some()
                        || data.hashes.remove(key).is_some()
                        || data.lists.remove(key).is_some()
                    {
                        removed += 1;
                    }
                }
            }
            write_integer(out, removed).await
        }
        b"EXPIRE" => {
            let Some(secs) = parse_u64(&args[2]) else {
                return write_error(out, "invalid expire time").await;
            };
            let set = {
                let mut data = inner.data.lock().expect("state mutex");
                match data.strings.get_mut(&args[1]) {
                    Some(entry) => {
                        entry.1 = Some(Instant::now() + Duration::from_secs(secs));
                        1
                    }
                    None => 0,
                }
            };
            write_integer(out, set).await
        }
        b"TTL" => {
            let reply = {
                let mut data = inner.data.lock().expect("state mutex");
                match data.get_string_entry(&args[1]) {
                    None => -2,
                    Some((_, None)) => -1,
                    Some((_, Some(deadline))) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        remaining.as_millis().div_ceil(1000) as i64
                    }
                }
            };
            write_integer(out, reply).await
        }
        b"INCR" => {
            let reply = {
                let mut data = inner.data.lock().expect("state mutex");
                let current = data.get_string(&args[1]);
                let parsed = match current {
                    None => Some(0i64),
                    Some(raw) => std::str::from_utf8(&raw).ok().and_then(|s| s.parse().ok()),
                };
                match parsed {
                    Some(value) => {
                        let next = value + 1;
                        data.strings
                            .insert(args[1].clone(), (next.to_string().into_bytes(), None));
                        Ok(next)
                    }
                    None => Err("value is not an integer or out of range"),
                }
            };
            match reply {
                Ok(next) => write_integer(out, next).await,
                Err(message) => write_error(out, message).await,
            }
        }
        b"KEYS" => {
            let keys: Vec<Vec<u8>> = {
                let mut data = inner.data.lock().expect("state mutex");
                data.purge_expired();
                let mut keys: Vec<Vec<u8>> = Vec::new();
                for key in data
                    .strings
                    .keys()
                    .chain(data.hashes.keys())
                    .chain(data.lists.keys())
                {
                    if args[1] == b"*" || key == &args[1] {
                        keys.push(key.clone());
                    }
                }
                keys
            };
            write_bulk_array(out, &keys).await
        }
        b"HGET" => {
            let value = {
                let data = inner.data.lock().expect("state mutex");
                data.hashes
                    .get(&args[1])
                    .and_then(|hash| hash.get(&args[2]).cloned())
            };
            match value {
                Some(value) => write_bulk(out, &value).await,
                None => write_null(out).await,
            }
        }
        b"HSET" => {
            let created = {
                let mut data = inner.data.lock().expect("state mutex");
                let hash = data.hashes.entry(args[1].clone()).or_default();
                if hash.insert(args[2].clone(), args[3].clone()).is_none() {
                    1
                } else {
                    0
                }
            };
            write_integer(out, created).await
        }
        b"HGETALL" => {
            let pairs: Vec<Vec<u8>> = {
                let data = inner.data.lock().expect("state mutex");
                match data.hashes.get(&args[1]) {
                    Some(hash) => hash
                        .iter()
                        .flat_map(|(field, value)| [field.clone(), value.clone()])
                        .collect(),
                    None => Vec::new(),
                }
            };
            write_bulk_array(out, &pairs).await
        }
        b"HDEL" => {
            let removed = {
                let mut data = inner.data.lock().expect("state mutex");
                let mut removed = 0i64;
                if let Some(hash) = data.hashes.get_mut(&args[1]) {
                    for field in &args[2..] {
                        if hash.remove(field).is_some() {
                            removed += 1;
                        }
                    }
                }
                removed
            };
            write_integer(out, removed).await
        }
        b"LPUSH" | b"RPUSH" => {
            let len = {
                let mut data = inner.data.lock().expect("state mutex");
                let list = data.lists.entry(args[1].clone()).or_default();
                if cmd == b"LPUSH" {
                    list.push_front(args[2].clone());
                } else {
                    list.push_back(args[2].clone());
                }
                list.len() as i64
            };
            write_integer(out, len).await
        }
        b"BLPOP" | b"BRPOP" => {
            // Poll until an element shows up; timeout argument 0 means wait
            // forever, which is all the pooled client ever sends.
            loop {
                let popped = {
                    let mut data = inner.data.lock().expect("state mutex");
                    data.lists.get_mut(&args[1]).and_then(|list| {
                        if cmd == b"BLPOP" {
                            list.pop_front()
                        } else {
                            list.pop_back()
                        }
                    })
                };
                if let Some(value) = popped {
                    return write_bulk_array(out, &[args[1].clone(), value]).await;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        _ => write_error(out, "unknown command").await,
    }
}

impl State {
    fn get_string(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.get_string_entry(key).map(|(value, _)| value)
    }

    fn get_string_entry(&mut self, key: &[u8]) -> Option<(Vec<u8>, Option<Instant>)> {
        let deadline = self.strings.get(key)?.1;
        if deadline.is_some_and(|d| d <= Instant::now()) {
            self.strings.remove(key);
            return None;
        }
        self.strings.get(key).cloned()
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.strings
            .retain(|_, (_, deadline)| deadline.is_none_or(|d| d > now));
    }
}

async fn read_command(
    reader: &mut BufReader<OwnedReadHalf>,
) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = Vec::new();
    if read_line(reader, &mut line).await?.is_none() {
        return Ok(None);
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_u64(&line[1..]).ok_or_else(|| invalid("bad array length"))? as usize;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        if read_line(reader, &mut line).await?.is_none() {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_u64(&line[1..]).ok_or_else(|| invalid("bad bulk length"))? as usize;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data).await?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
        if crlf != *b"\r\n" {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    Ok(Some(args))
}

async fn read_line(
    reader: &mut BufReader<OwnedReadHalf>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<()>> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf).await?;
    if bytes == 0 {
        return Ok(None);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_u64(data: &[u8]) -> Option<u64> {
    std::str::from_utf8(data).ok()?.parse().ok()
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

async fn write_simple(out: &mut OwnedWriteHalf, message: &str) -> std::io::Result<()> {
    out.write_all(format!("+{message}\r\n").as_bytes()).await
}

async fn write_error(out: &mut OwnedWriteHalf, message: &str) -> std::io::Result<()> {
    out.write_all(format!("-ERR {message}\r\n").as_bytes()).await
}

async fn write_integer(out: &mut OwnedWriteHalf, value: i64) -> std::io::Result<()> {
    out.write_all(format!(":{value}\r\n").as_bytes()).await
}

async fn write_bulk(out: &mut OwnedWriteHalf, data: &[u8]) -> std::io::Result<()> {
    out.write_all(format!("${}\r\n", data.len()).as_bytes())
        .await?;
    out.write_all(data).await?;
    out.write_all(b"\r\n").await
}

async fn write_null(out: &mut OwnedWriteHalf) -> std::io::Result<()> {
    out.write_all(b"$-1\r\n").await
}

async fn write_bulk_array(out: &mut OwnedWriteHalf, items: &[Vec<u8>]) -> std::io::Result<()> {
    out.write_all(format!("*{}\r\n", items.len()).as_bytes())
        .await?;
    for item in items {
        write_bulk(out, item).await?;
    }
    Ok(())
}

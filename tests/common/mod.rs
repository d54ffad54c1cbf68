//! In-process RESP server speaking just enough Redis for the client tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alauda_redis_client::core::connection::Connection;
use alauda_redis_client::key_slot;
use alauda_redis_client::proto::frame::Frame;
use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;

enum Value {
    Str(Bytes),
    Hash(HashMap<String, Bytes>),
}

#[derive(Default)]
struct State {
    data: HashMap<String, Value>,
    expiry: HashMap<String, i64>,
    log: Vec<String>,
    password: Option<String>,
    slots: Option<Frame>,
    /// Error replies for commands on a key; `true` means reply once.
    errors: HashMap<String, (String, bool)>,
    asking_required: HashSet<String>,
    replica_of: Option<String>,
    delays: HashMap<String, Duration>,
}

#[derive(Default)]
struct Session {
    authenticated: bool,
    readonly: bool,
    asking: bool,
}

/// A mock Redis node bound to an ephemeral localhost port.
pub struct MockServer {
    pub addr: String,
    pub port: u16,
    state: Arc<Mutex<State>>,
    accept: AbortHandle,
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
    accepted: Arc<AtomicUsize>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.kill();
    }
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let tasks = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));

        let shared = state.clone();
        let handles = tasks.clone();
        let counter = accepted.clone();
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let conn = tokio::spawn(serve(stream, shared.clone()));
                handles.lock().unwrap().push(conn.abort_handle());
            }
        });

        Self {
            addr: local.to_string(),
            port: local.port(),
            state,
            accept: accept.abort_handle(),
            tasks,
            accepted,
        }
    }

    /// Stops accepting and closes every open connection.
    pub fn kill(&self) {
        self.accept.abort();
        self.drop_connections();
    }

    /// Closes every open connection but keeps accepting new ones.
    pub fn drop_connections(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Holds back every reply for commands on `key` by `delay`.
    pub fn delay_key(&self, key: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(key.to_string(), delay);
    }

    pub fn require_password(&self, password: &str) {
        self.state.lock().unwrap().password = Some(password.to_string());
    }

    pub fn set_slots(&self, slots: Frame) {
        self.state.lock().unwrap().slots = Some(slots);
    }

    /// Answers every command on `key` with `error`.
    pub fn fail_key(&self, key: &str, error: &str) {
        self.state
            .lock()
            .unwrap()
            .errors
            .insert(key.to_string(), (error.to_string(), false));
    }

    /// Answers the next command on `key` with `error`.
    pub fn fail_key_once(&self, key: &str, error: &str) {
        self.state
            .lock()
            .unwrap()
            .errors
            .insert(key.to_string(), (error.to_string(), true));
    }

    /// Serves `key` only right after ASKING.
    pub fn require_asking(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .asking_required
            .insert(key.to_string());
    }

    /// Behaves as a replica: reads need READONLY, writes are MOVED to `master`.
    pub fn replica_of(&self, master: &MockServer) {
        self.state.lock().unwrap().replica_of = Some(master.addr.clone());
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .data
            .insert(key.to_string(), Value::Str(Bytes::from(value.to_string())));
    }

    /// Every command received, as `NAME arg arg`.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// How many received commands start with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .count()
    }

    pub fn received(&self, command: &str) -> bool {
        self.commands().iter().any(|cmd| cmd == command)
    }
}

/// Builds a `CLUSTER SLOTS` reply: `(start, end, master, replicas)`.
pub fn slots(ranges: &[(u16, u16, &MockServer, &[&MockServer])]) -> Frame {
    let node = |server: &MockServer| {
        Frame::Array(vec![
            Frame::bulk("127.0.0.1"),
            Frame::Integer(i64::from(server.port)),
            Frame::bulk(format!("node-{}", server.port)),
        ])
    };
    Frame::Array(
        ranges
            .iter()
            .map(|(start, end, master, replicas)| {
                let mut entry = vec![
                    Frame::Integer(i64::from(*start)),
                    Frame::Integer(i64::from(*end)),
                    node(*master),
                ];
                entry.extend(replicas.iter().map(|replica| node(*replica)));
                Frame::Array(entry)
            })
            .collect(),
    )
}

/// First `prefix{n}` key hashing into `start..=end`.
pub fn key_in(prefix: &str, start: u16, end: u16) -> String {
    (0..100_000)
        .map(|n| format!("{prefix}{n}"))
        .find(|key| (start..=end).contains(&key_slot(key)))
        .unwrap()
}

async fn serve(stream: TcpStream, state: Arc<Mutex<State>>) {
    let mut conn = Connection::new(stream);
    let mut session = Session::default();
    while let Ok(frame) = conn.read_frame().await {
        if let Some(delay) = delay_for(&state, &frame) {
            tokio::time::sleep(delay).await;
        }
        let reply = state.lock().unwrap().handle(frame, &mut session);
        if conn.write_frame(&reply).await.is_err() {
            return;
        }
    }
}

fn delay_for(state: &Mutex<State>, frame: &Frame) -> Option<Duration> {
    let Frame::Array(items) = frame else {
        return None;
    };
    let Some(Frame::BulkString(Some(key))) = items.get(1) else {
        return None;
    };
    let key = String::from_utf8_lossy(key);
    state.lock().unwrap().delays.get(&*key).copied()
}

fn args_of(frame: Frame) -> Vec<String> {
    match frame {
        Frame::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Frame::BulkString(Some(b)) => String::from_utf8_lossy(&b).into_owned(),
                other => other.as_text().unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn ok() -> Frame {
    Frame::simple("OK")
}

fn int(n: i64) -> Frame {
    Frame::Integer(n)
}

fn nil() -> Frame {
    Frame::BulkString(None)
}

fn is_read(name: &str) -> bool {
    matches!(name, "GET" | "EXISTS" | "TTL" | "HGET" | "HGETALL")
}

impl State {
    fn handle(&mut self, frame: Frame, session: &mut Session) -> Frame {
        let mut args = args_of(frame);
        if args.is_empty() {
            return Frame::error("ERR empty command");
        }
        args[0] = args[0].to_ascii_uppercase();
        self.log.push(args.join(" "));

        let asking = std::mem::take(&mut session.asking);
        let name = args[0].as_str();

        if name == "AUTH" {
            let password = args.last().cloned().unwrap_or_default();
            return if self.password.as_deref() == Some(password.as_str()) {
                session.authenticated = true;
                ok()
            } else {
                Frame::error("WRONGPASS invalid username-password pair or user is disabled.")
            };
        }
        if self.password.is_some() && !session.authenticated {
            return Frame::error("NOAUTH Authentication required.");
        }

        match name {
            "PING" => return Frame::simple("PONG"),
            "ECHO" => return Frame::bulk(args.get(1).cloned().unwrap_or_default()),
            "SELECT" | "CLIENT" => return ok(),
            "READONLY" => {
                session.readonly = true;
                return ok();
            }
            "ASKING" => {
                session.asking = true;
                return ok();
            }
            "CLUSTER" => {
                return match &self.slots {
                    Some(slots) => slots.clone(),
                    None => Frame::error("ERR This instance has cluster support disabled"),
                }
            }
            _ => {}
        }

        let Some(key) = args.get(1).cloned() else {
            return Frame::error("ERR wrong number of arguments");
        };

        if let Some((error, once)) = self.errors.get(&key).cloned() {
            if once {
                self.errors.remove(&key);
            }
            return Frame::error(&error);
        }
        if self.asking_required.contains(&key) && !asking {
            return Frame::error("ERR ASKING required");
        }
        if let Some(master) = &self.replica_of {
            if !is_read(name) || !session.readonly {
                return Frame::error(&format!("MOVED {} {}", key_slot(&key), master));
            }
        }

        self.execute(name, &key, &args[2..])
    }

    fn execute(&mut self, name: &str, key: &str, rest: &[String]) -> Frame {
        match name {
            "GET" => match self.data.get(key) {
                Some(Value::Str(v)) => Frame::BulkString(Some(v.clone())),
                Some(Value::Hash(_)) => wrong_type(),
                None => nil(),
            },
            "SET" => {
                self.data
                    .insert(key.to_string(), Value::Str(Bytes::from(rest[0].clone())));
                match rest.iter().position(|a| a.eq_ignore_ascii_case("EX")) {
                    Some(i) => {
                        let secs = rest[i + 1].parse().unwrap_or(0);
                        self.expiry.insert(key.to_string(), secs);
                    }
                    None => {
                        self.expiry.remove(key);
                    }
                }
                ok()
            }
            "SETNX" => {
                if self.data.contains_key(key) {
                    int(0)
                } else {
                    self.data
                        .insert(key.to_string(), Value::Str(Bytes::from(rest[0].clone())));
                    int(1)
                }
            }
            "DEL" => {
                self.expiry.remove(key);
                int(i64::from(self.data.remove(key).is_some()))
            }
            "EXISTS" => int(i64::from(self.data.contains_key(key))),
            "EXPIRE" => {
                if self.data.contains_key(key) {
                    self.expiry
                        .insert(key.to_string(), rest[0].parse().unwrap_or(0));
                    int(1)
                } else {
                    int(0)
                }
            }
            "TTL" => match (self.data.contains_key(key), self.expiry.get(key)) {
                (false, _) => int(-2),
                (true, None) => int(-1),
                (true, Some(secs)) => int(*secs),
            },
            "INCR" | "INCRBY" | "DECR" | "DECRBY" => {
                let delta: i64 = match name {
                    "INCR" => 1,
                    "DECR" => -1,
                    "INCRBY" => rest[0].parse().unwrap_or(0),
                    _ => -rest[0].parse::<i64>().unwrap_or(0),
                };
                let current = match self.data.get(key) {
                    None => 0,
                    Some(Value::Str(v)) => {
                        match std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()) {
                            Some(n) => n,
                            None => {
                                return Frame::error("ERR value is not an integer or out of range")
                            }
                        }
                    }
                    Some(Value::Hash(_)) => return wrong_type(),
                };
                let next = current + delta;
                self.data
                    .insert(key.to_string(), Value::Str(Bytes::from(next.to_string())));
                int(next)
            }
            "HSET" | "HGET" | "HDEL" | "HGETALL" => {
                let hash = match self
                    .data
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Hash(HashMap::new()))
                {
                    Value::Hash(hash) => hash,
                    Value::Str(_) => return wrong_type(),
                };
                let reply = match name {
                    "HSET" => int(i64::from(
                        hash.insert(rest[0].clone(), Bytes::from(rest[1].clone()))
                            .is_none(),
                    )),
                    "HGET" => hash
                        .get(&rest[0])
                        .map_or_else(nil, |v| Frame::BulkString(Some(v.clone()))),
                    "HDEL" => int(rest.iter().filter(|f| hash.remove(*f).is_some()).count() as i64),
                    _ => Frame::Array(
                        hash.iter()
                            .flat_map(|(f, v)| [Frame::bulk(f.clone()), Frame::BulkString(Some(v.clone()))])
                            .collect(),
                    ),
                };
                if hash.is_empty() {
                    self.data.remove(key);
                }
                reply
            }
            _ => Frame::error(&format!("ERR unknown command '{name}'")),
        }
    }
}

fn wrong_type() -> Frame {
    Frame::error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

//! Command Dispatch and Handlers
//!
//! The verb of each request is upper-cased and resolved against the fixed
//! set of [`Command`]s. Everything else in the request is handed to that
//! command's handler as its arguments.
//!
//! ## Snapshot-backed reads
//!
//! `GET` consults the snapshot file before memory, creating the file from
//! the store if it does not exist yet. A value written with `SET` after the
//! last `SAVE` is therefore shadowed by the older snapshot value for the same
//! key until the next `SAVE`. `KEYS` lists only what the snapshot file holds
//! and never looks at the live store.

use crate::config::ServerConfig;
use crate::protocol::RespValue;
use crate::snapshot::Snapshot;
use crate::storage::Store;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, warn};

/// Every verb the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Echo,
    Set,
    Get,
    Config,
    Save,
    Keys,
}

impl Command {
    /// Resolves an upper-cased verb.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PING" => Some(Command::Ping),
            "ECHO" => Some(Command::Echo),
            "SET" => Some(Command::Set),
            "GET" => Some(Command::Get),
            "CONFIG" => Some(Command::Config),
            "SAVE" => Some(Command::Save),
            "KEYS" => Some(Command::Keys),
            _ => None,
        }
    }

    /// Lower-case name used in error replies.
    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Echo => "echo",
            Command::Set => "set",
            Command::Get => "get",
            Command::Config => "config",
            Command::Save => "save",
            Command::Keys => "keys",
        }
    }

    /// Whether the command reads or writes the snapshot file.
    pub fn touches_snapshot(self) -> bool {
        matches!(self, Command::Get | Command::Save | Command::Keys)
    }

    /// Resolves the verb of a request without executing it.
    pub fn of_request(request: &RespValue) -> Option<Self> {
        match request {
            RespValue::Array(args) => args.first().and_then(|v| Self::from_name(&verb(v))),
            _ => None,
        }
    }
}

/// Upper-cased verb of a request, or an empty string if it is not text.
fn verb(value: &RespValue) -> String {
    value.as_str().map(str::to_ascii_uppercase).unwrap_or_default()
}

fn wrong_arity(command: Command) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        command.name()
    ))
}

fn invalid_config() -> RespValue {
    RespValue::error("ERR invalid parameters for 'config' command")
}

fn unreadable_snapshot() -> RespValue {
    RespValue::error("ERR unable to read file")
}

/// True if `needle` occurs anywhere in `haystack`.
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Executes requests against the shared store and snapshot.
///
/// Cheap to clone; each connection gets its own copy.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
    snapshot: Arc<Snapshot>,
    config: Arc<ServerConfig>,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>, snapshot: Arc<Snapshot>, config: Arc<ServerConfig>) -> Self {
        Self {
            store,
            snapshot,
            config,
        }
    }

    /// Executes one request.
    ///
    /// Returns `None` when the request is not a non-empty array; such
    /// requests get no reply and the connection carries on.
    pub fn execute(&self, request: RespValue) -> Option<RespValue> {
        let args = match request {
            RespValue::Array(args) if !args.is_empty() => args,
            other => {
                debug!(request = %other, "Ignoring request that is not a command array");
                return None;
            }
        };

        let name = verb(&args[0]);
        match Command::from_name(&name) {
            Some(command) => Some(self.dispatch(command, &args[1..])),
            None => {
                debug!(command = %name, "Unknown command");
                Some(RespValue::empty())
            }
        }
    }

    fn dispatch(&self, command: Command, args: &[RespValue]) -> RespValue {
        match command {
            Command::Ping => self.cmd_ping(args),
            Command::Echo => self.cmd_echo(args),
            Command::Set => self.cmd_set(args),
            Command::Get => self.cmd_get(args),
            Command::Config => self.cmd_config(args),
            Command::Save => self.cmd_save(args),
            Command::Keys => self.cmd_keys(args),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> RespValue {
        match args.first().and_then(RespValue::as_bytes) {
            Some(msg) => RespValue::status(msg),
            None => RespValue::pong(),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[RespValue]) -> RespValue {
        match args.first().and_then(RespValue::as_bytes) {
            Some(msg) => RespValue::status(msg),
            None => wrong_arity(Command::Echo),
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[RespValue]) -> RespValue {
        let (Some(key), Some(value)) = (
            args.first().and_then(RespValue::to_bytes),
            args.get(1).and_then(RespValue::to_bytes),
        ) else {
            return wrong_arity(Command::Set);
        };

        let mut expires_at = None;
        let is_px = args
            .get(2)
            .and_then(RespValue::as_bytes)
            .is_some_and(|opt| opt.eq_ignore_ascii_case(b"px"));
        if is_px {
            let Some(raw) = args.get(3) else {
                return RespValue::error("ERR syntax error");
            };
            let Some(ms) = raw.as_str().and_then(|s| s.parse::<u64>().ok()) else {
                return RespValue::error("ERR value is not an integer or out of range");
            };
            expires_at = Some(SystemTime::now() + Duration::from_millis(ms));
        }

        self.store.set(key, value, expires_at);
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        let Some(key) = args.first().and_then(RespValue::to_bytes) else {
            return wrong_arity(Command::Get);
        };

        let snapshot = match self.snapshot.load_or_create(&self.store) {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_encoding() => return RespValue::error(format!("ERR {}", e)),
            Err(e) => {
                warn!(path = %self.snapshot.path().display(), error = %e, "Failed to read snapshot");
                return unreadable_snapshot();
            }
        };

        if let Some(value) = snapshot.entries.get(&key).filter(|v| !v.is_empty()) {
            return RespValue::bulk_string(value.clone());
        }

        match self.store.get(&key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// CONFIG GET dir|dbfilename
    fn cmd_config(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_arity(Command::Config);
        }

        let is_get = args[0]
            .as_bytes()
            .is_some_and(|sub| sub.eq_ignore_ascii_case(b"get"));
        if !is_get {
            return invalid_config();
        }

        let (name, value) = match args[1].as_bytes() {
            Some(p) if p.eq_ignore_ascii_case(b"dir") => ("dir", &self.config.dir),
            Some(p) if p.eq_ignore_ascii_case(b"dbfilename") => {
                ("dbfilename", &self.config.dbfilename)
            }
            _ => return invalid_config(),
        };

        RespValue::array(vec![
            RespValue::bulk_string(name),
            RespValue::bulk_string(Bytes::copy_from_slice(value.as_bytes())),
        ])
    }

    /// SAVE
    ///
    /// Replies `OK` even when the write fails; the failure is only logged.
    fn cmd_save(&self, _args: &[RespValue]) -> RespValue {
        if let Err(e) = self.snapshot.save(&self.store) {
            error!(path = %self.snapshot.path().display(), error = %e, "Snapshot save failed");
        }
        RespValue::ok()
    }

    /// KEYS pattern
    ///
    /// `*` lists every key in the snapshot file; anything else lists the
    /// keys that contain `pattern` as a substring.
    fn cmd_keys(&self, args: &[RespValue]) -> RespValue {
        let Some(pattern) = args.first().and_then(RespValue::as_bytes) else {
            return wrong_arity(Command::Keys);
        };

        let snapshot = match self.snapshot.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.snapshot.path().display(), error = %e, "Failed to read snapshot");
                return unreadable_snapshot();
            }
        };

        let mut keys: Vec<&Bytes> = snapshot
            .entries
            .keys()
            .filter(|key| pattern == b"*" || contains(&key[..], pattern))
            .collect();
        keys.sort();

        RespValue::array(
            keys.into_iter()
                .map(|key| RespValue::status(key))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Fixture {
        handler: CommandHandler,
        store: Arc<Store>,
        config: Arc<ServerConfig>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ServerConfig {
            dir: dir.path().display().to_string(),
            ..ServerConfig::default()
        });
        let store = Arc::new(Store::new());
        let snapshot = Arc::new(Snapshot::new(config.snapshot_path()));
        Fixture {
            handler: CommandHandler::new(Arc::clone(&store), snapshot, Arc::clone(&config)),
            store,
            config,
            _dir: dir,
        }
    }

    fn make_command(args: &[&str]) -> RespValue {
        RespValue::Array(
            args.iter()
                .map(|s| RespValue::bulk_string(Bytes::copy_from_slice(s.as_bytes())))
                .collect(),
        )
    }

    impl Fixture {
        fn run(&self, args: &[&str]) -> RespValue {
            self.handler
                .execute(make_command(args))
                .expect("command should produce a reply")
        }

        fn keys(&self, pattern: &str) -> Vec<String> {
            match self.run(&["KEYS", pattern]) {
                RespValue::Array(items) => items
                    .into_iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect(),
                other => panic!("expected array, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_ping() {
        let f = fixture();
        assert_eq!(f.run(&["PING"]), RespValue::simple_string("PONG"));
        assert_eq!(f.run(&["ping", "hi"]), RespValue::simple_string("hi"));
    }

    #[test]
    fn test_echo() {
        let f = fixture();
        assert_eq!(f.run(&["ECHO", "hey"]), RespValue::simple_string("hey"));
        assert_eq!(f.run(&["PING", "hi"]), RespValue::simple_string("hi"));
        assert_eq!(
            f.run(&["ECHO"]),
            RespValue::error("ERR wrong number of arguments for 'echo' command")
        );
    }

    #[test]
    fn test_unknown_command_gets_empty_reply() {
        let f = fixture();
        assert_eq!(f.run(&["FLUSHALL"]), RespValue::empty());
    }

    #[test]
    fn test_non_command_requests_get_no_reply() {
        let f = fixture();
        assert_eq!(f.handler.execute(RespValue::Array(vec![])), None);
        assert_eq!(f.handler.execute(RespValue::bulk_string("PING")), None);
    }

    #[test]
    fn test_set_get_creates_snapshot() {
        let f = fixture();
        let path = f.config.snapshot_path();
        assert_eq!(f.run(&["SET", "foo", "bar"]), RespValue::ok());
        assert!(!std::path::Path::new(&path).exists());

        assert_eq!(f.run(&["GET", "foo"]), RespValue::bulk_string("bar"));
        assert!(std::path::Path::new(&path).exists());
    }

    #[test]
    fn test_get_missing_key() {
        let f = fixture();
        assert_eq!(f.run(&["GET", "nope"]), RespValue::null());
    }

    #[test]
    fn test_get_falls_back_to_memory() {
        let f = fixture();
        f.run(&["SAVE"]);
        f.run(&["SET", "later", "value"]);
        assert_eq!(f.run(&["GET", "later"]), RespValue::bulk_string("value"));
    }

    #[test]
    fn test_get_prefers_stale_snapshot_value() {
        let f = fixture();
        f.run(&["SET", "k", "old"]);
        f.run(&["SAVE"]);
        f.run(&["SET", "k", "new"]);
        assert_eq!(f.run(&["GET", "k"]), RespValue::bulk_string("old"));

        f.run(&["SAVE"]);
        assert_eq!(f.run(&["GET", "k"]), RespValue::bulk_string("new"));
    }

    #[test]
    fn test_set_arity() {
        let f = fixture();
        assert_eq!(
            f.run(&["SET", "k"]),
            RespValue::error("ERR wrong number of arguments for 'set' command")
        );
        assert_eq!(
            f.run(&["GET"]),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_set_px_expires() {
        let f = fixture();
        f.run(&["SAVE"]);
        assert_eq!(f.run(&["SET", "x", "1", "PX", "1"]), RespValue::ok());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(f.run(&["GET", "x"]), RespValue::null());
        assert!(!f.store.contains(b"x"));
    }

    #[test]
    fn test_set_px_ttl_boundary() {
        let f = fixture();
        f.run(&["SAVE"]);
        f.run(&["SET", "k", "v", "px", "50"]);
        assert_eq!(f.run(&["GET", "k"]), RespValue::bulk_string("v"));
        thread::sleep(Duration::from_millis(80));
        assert_eq!(f.run(&["GET", "k"]), RespValue::null());
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_set_px_errors() {
        let f = fixture();
        assert_eq!(
            f.run(&["SET", "k", "v", "px"]),
            RespValue::error("ERR syntax error")
        );
        assert_eq!(
            f.run(&["SET", "k", "v", "px", "soon"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_set_ignores_other_options() {
        let f = fixture();
        assert_eq!(f.run(&["SET", "k", "v", "EX", "1"]), RespValue::ok());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(f.store.get(b"k"), Some(Bytes::from("v")));
    }

    #[test]
    fn test_config_get() {
        let f = fixture();
        assert_eq!(
            f.run(&["CONFIG", "GET", "dir"]),
            RespValue::array(vec![
                RespValue::bulk_string("dir"),
                RespValue::bulk_string(Bytes::from(f.config.dir.clone())),
            ])
        );
        assert_eq!(
            f.run(&["config", "get", "dbfilename"]),
            RespValue::array(vec![
                RespValue::bulk_string("dbfilename"),
                RespValue::bulk_string("dump.rdb"),
            ])
        );
    }

    #[test]
    fn test_config_errors() {
        let f = fixture();
        let invalid = RespValue::error("ERR invalid parameters for 'config' command");
        assert_eq!(f.run(&["CONFIG", "GET", "port"]), invalid);
        assert_eq!(f.run(&["CONFIG", "SET", "dir"]), invalid);
        assert_eq!(
            f.run(&["CONFIG", "GET"]),
            RespValue::error("ERR wrong number of arguments for 'config' command")
        );
    }

    #[test]
    fn test_keys_reads_snapshot_only() {
        let f = fixture();
        f.run(&["SET", "a", "1"]);
        f.run(&["SET", "b", "2"]);
        f.run(&["SAVE"]);
        f.run(&["SET", "abc", "3"]);

        assert_eq!(f.keys("*"), vec!["a", "b"]);
        assert_eq!(f.keys("a"), vec!["a"]);
        assert_eq!(f.keys("a*"), Vec::<String>::new());
    }

    #[test]
    fn test_echo_with_line_break_is_one_reply() {
        let f = fixture();
        let reply = f.run(&["ECHO", "a\r\n-ERR injected"]).serialize();
        let (decoded, consumed) = crate::protocol::parse_message(&reply).unwrap().unwrap();
        assert_eq!(consumed, reply.len());
        assert_eq!(decoded, RespValue::bulk_string("a\r\n-ERR injected"));
    }

    #[test]
    fn test_keys_with_line_break_is_one_reply() {
        let f = fixture();
        f.run(&["SET", "bad\r\n+key", "v"]);
        f.run(&["SAVE"]);
        assert_eq!(
            f.run(&["KEYS", "*"]),
            RespValue::array(vec![RespValue::bulk_string("bad\r\n+key")])
        );
    }

    #[test]
    fn test_keys_substring_match() {
        let f = fixture();
        f.run(&["SET", "user:1", "x"]);
        f.run(&["SET", "user:2", "y"]);
        f.run(&["SET", "session", "z"]);
        f.run(&["SAVE"]);
        assert_eq!(f.keys("user"), vec!["user:1", "user:2"]);
        assert_eq!(f.keys("ss"), vec!["session"]);
    }

    #[test]
    fn test_keys_without_snapshot() {
        let f = fixture();
        assert_eq!(
            f.run(&["KEYS", "*"]),
            RespValue::error("ERR unable to read file")
        );
    }

    #[test]
    fn test_save_always_ok() {
        let store = Arc::new(Store::new());
        let snapshot = Arc::new(Snapshot::new("/nonexistent-dir/for/snapshots/dump.rdb"));
        let handler = CommandHandler::new(store, snapshot, Arc::new(ServerConfig::default()));
        assert_eq!(
            handler.execute(make_command(&["SAVE"])),
            Some(RespValue::ok())
        );
    }

    #[test]
    fn test_get_reports_oversized_value() {
        let f = fixture();
        let big = "x".repeat(16384);
        f.run(&["SET", "big", &big]);
        match f.run(&["GET", "big"]) {
            RespValue::Error(msg) => assert!(msg.starts_with("ERR string too long")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_get_unreadable_snapshot() {
        let f = fixture();
        std::fs::write(f.config.snapshot_path(), b"not a snapshot").unwrap();
        assert_eq!(
            f.run(&["GET", "k"]),
            RespValue::error("ERR unable to read file")
        );
    }

    #[test]
    fn test_concurrent_sets() {
        let f = fixture();
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let handler = f.handler.clone();
                thread::spawn(move || {
                    let key = format!("key{}", i);
                    let reply = handler.execute(make_command(&["SET", &key, "v"]));
                    assert_eq!(reply, Some(RespValue::ok()));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(f.store.len(), 32);
        for i in 0..32 {
            let key = format!("key{}", i);
            assert_eq!(f.run(&["GET", &key]), RespValue::bulk_string("v"));
        }
    }

    #[test]
    fn test_command_names() {
        assert_eq!(Command::from_name("KEYS"), Some(Command::Keys));
        assert_eq!(Command::from_name("keys"), None);
        assert_eq!(Command::Config.name(), "config");
    }

    #[test]
    fn test_snapshot_commands() {
        assert_eq!(
            Command::of_request(&make_command(&["save"])),
            Some(Command::Save)
        );
        assert_eq!(Command::of_request(&make_command(&["NOPE"])), None);
        assert_eq!(Command::of_request(&RespValue::bulk_string("GET")), None);
        assert!(Command::Get.touches_snapshot());
        assert!(Command::Keys.touches_snapshot());
        assert!(Command::Save.touches_snapshot());
        assert!(!Command::Set.touches_snapshot());
        assert!(!Command::Ping.touches_snapshot());
    }
}

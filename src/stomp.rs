//! Minimal STOMP 1.2 codec for text WebSocket messages.
//!
//! Covers what a subscribing/publishing client needs: CONNECT, SUBSCRIBE,
//! SEND and DISCONNECT out; CONNECTED, MESSAGE, RECEIPT and ERROR in; and
//! heart-beats (bare end-of-line) in both directions.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{VizError, VizResult};

/// Body-less end-of-line sent as a heart-beat.
pub const HEARTBEAT: &str = "\n";

/// An incoming heart-beat older than this many intervals means the
/// connection is gone.
const HEARTBEAT_GRACE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let command = match line {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "SEND" => Command::Send,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            _ => return None,
        };
        Some(command)
    }

    /// CONNECT and CONNECTED headers are sent raw; every other frame
    /// escapes `\r`, `\n`, `:` and `\` in header names and values.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of `name`; repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, heart_beat: (u64, u64)) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", format!("{},{}", heart_beat.0, heart_beat.1))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn send(destination: &str, json: String) -> Self {
        let length = json.len();
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", length.to_string())
            .body(json)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_header(raw: &str) -> VizResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(VizError::malformed(format!(
                    "invalid STOMP header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Heartbeat,
    Frame(Frame),
}

/// Split a WebSocket text message into heart-beats and frames.
pub fn decode(message: &str) -> VizResult<Vec<Incoming>> {
    let mut items = Vec::new();
    let mut rest = message;

    loop {
        let trimmed = rest.trim_start_matches(['\r', '\n']);
        if trimmed.len() != rest.len() {
            items.push(Incoming::Heartbeat);
        }
        rest = trimmed;
        if rest.is_empty() {
            break;
        }

        let (frame, remaining) = decode_frame(rest)?;
        items.push(Incoming::Frame(frame));
        rest = remaining;
    }

    Ok(items)
}

fn decode_frame(input: &str) -> VizResult<(Frame, &str)> {
    let (command_line, mut rest) = split_line(input)
        .ok_or_else(|| VizError::malformed("STOMP frame without command line"))?;
    let command = Command::parse(command_line)
        .ok_or_else(|| VizError::malformed(format!("unknown STOMP command '{}'", command_line)))?;

    let mut frame = Frame::new(command);
    loop {
        let (line, after) = split_line(rest)
            .ok_or_else(|| VizError::malformed("STOMP frame ended inside headers"))?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| VizError::malformed(format!("STOMP header without ':' in '{}'", line)))?;
        let (name, value) = if command.escapes_headers() {
            (unescape_header(name)?, unescape_header(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        frame.headers.push((name, value));
    }

    let body_end = match frame.get("content-length") {
        Some(length) => {
            let length: usize = length.trim().parse().map_err(|_| {
                VizError::malformed(format!("invalid content-length '{}'", length))
            })?;
            if rest.len() <= length || rest.as_bytes()[length] != 0 {
                return Err(VizError::malformed("STOMP body shorter than content-length"));
            }
            length
        }
        None => rest
            .find('\0')
            .ok_or_else(|| VizError::malformed("STOMP frame is missing its NUL terminator"))?,
    };

    let body = rest
        .get(..body_end)
        .ok_or_else(|| VizError::malformed("content-length splits a character"))?;
    frame.body = body.to_string();
    Ok((frame, &rest[body_end + 1..]))
}

/// Split off one line, accepting `\n` or `\r\n`.
fn split_line(input: &str) -> Option<(&str, &str)> {
    let end = input.find('\n')?;
    let line = input[..end].strip_suffix('\r').unwrap_or(&input[..end]);
    Some((line, &input[end + 1..]))
}

/// Parse a `heart-beat: x,y` header value.
pub fn parse_heart_beat(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Heart-beat intervals agreed for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeats {
    /// We send a heart-beat at least this often.
    pub send_every: Option<Duration>,
    /// The broker sends at least this often.
    pub expect_every: Option<Duration>,
}

/// STOMP 1.2 negotiation: `client` is what we put in CONNECT
/// (`can send`, `want to receive`), `server` what came back in CONNECTED.
pub fn negotiate(client: (u64, u64), server: (u64, u64)) -> Heartbeats {
    let pick = |ours: u64, theirs: u64| {
        (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
    };
    Heartbeats {
        send_every: pick(client.0, server.1),
        expect_every: pick(client.1, server.0),
    }
}

/// Tracks heart-beat deadlines for one connection.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    beats: Heartbeats,
    last_sent: Instant,
    last_received: Instant,
}

impl HeartbeatMonitor {
    pub fn new(beats: Heartbeats, now: Instant) -> Self {
        Self {
            beats,
            last_sent: now,
            last_received: now,
        }
    }

    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Any traffic from the broker counts as a heart-beat.
    pub fn record_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    pub fn send_due(&self, now: Instant) -> bool {
        self.beats
            .send_every
            .is_some_and(|every| now.duration_since(self.last_sent) >= every)
    }

    pub fn is_lost(&self, now: Instant) -> bool {
        self.beats
            .expect_every
            .is_some_and(|every| now.duration_since(self.last_received) > every * HEARTBEAT_GRACE)
    }
}

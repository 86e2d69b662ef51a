//! Line-oriented debugging console on top of a [`Session`].
//!
//! The console owns the session and is its only writer. User input and wire
//! events are interleaved by [`run`], and every handler returns the lines to
//! print instead of printing them, so the behaviour can be driven from tests.

use std::str::FromStr;

use color_eyre::{eyre::eyre, Result};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::config::ConsoleConfig;
use crate::mqtt::log_processor::{DisplayedMessage, DuplicateWindow, ViewFilter};
use crate::mqtt::session::Session;
use crate::mqtt::wire::{SessionEvents, WireConnector, WireEvent, WireEventKind};
use crate::protocol::templates::{Template, TopicScheme};
use crate::protocol::{classify, UnknownKind};

const HELP: &str = "\
commands:
  connect [url] [client-id]      connect to a broker (defaults from config)
  disconnect                     end the session and drop its messages
  sub <topic>                    subscribe to a topic filter
  unsub <topic>                  unsubscribe from a topic filter
  topics                         list subscribed topics
  pub [-r] <topic> <payload...>  publish text, -r sets the retained flag
  pubjson [-r] <topic> <json...> publish after checking the payload is JSON
  template <kind> [recipient]    print a protocol template and its topic
  send <kind> [recipient]        publish a protocol template
  filter [text]                  only show topics containing text
  dedup on|off                   collapse repeats inside the duplicate window
  cap <n|off>                    limit the number of shown messages
  follow on|off                  echo matching messages as they arrive
  show                           print the filtered message list
  clear                          drop all logged messages
  status                         connection and view settings
  error                          print the current error
  clear-error                    dismiss the current error
  help                           this text
  quit                           disconnect and exit
kinds: TEXT IMAGE LOCATION PROFILE_UPDATE REQUEST_PROFILE TYPING ONLINE_POLL ONLINE_RESPONSE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),
    #[error("`{command}` needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("expected on or off, got `{0}`")]
    InvalidSwitch(String),
    #[error("expected a message count or off, got `{0}`")]
    InvalidCap(String),
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        url: Option<String>,
        client_id: Option<String>,
    },
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Topics,
    Publish {
        topic: String,
        payload: String,
        retained: bool,
        json: bool,
    },
    ShowTemplate {
        template: Template,
        recipient: Option<String>,
    },
    SendTemplate {
        template: Template,
        recipient: Option<String>,
    },
    Filter(String),
    Dedup(bool),
    Cap(Option<usize>),
    Follow(bool),
    Show,
    Clear,
    Status,
    Error,
    ClearError,
    Help,
    Quit,
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

fn optional(word: &str) -> Option<String> {
    (!word.is_empty()).then(|| word.to_string())
}

fn switch(word: &str) -> Result<bool, CommandError> {
    match word.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(CommandError::InvalidSwitch(word.to_string())),
    }
}

fn template(command: &'static str, rest: &str) -> Result<(Template, Option<String>), CommandError> {
    let (kind, rest) = split_word(rest);
    if kind.is_empty() {
        return Err(CommandError::MissingArgument {
            command,
            argument: "a message kind",
        });
    }
    let (recipient, _) = split_word(rest);
    Ok((kind.parse()?, optional(recipient)))
}

fn publish(rest: &str, json: bool) -> Command {
    let (first, after_first) = split_word(rest);
    let (retained, rest) = if first == "-r" {
        (true, after_first)
    } else {
        (false, rest)
    };
    let (topic, payload) = split_word(rest);
    Command::Publish {
        topic: topic.to_string(),
        payload: payload.to_string(),
        retained,
        json,
    }
}

impl Command {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let (word, rest) = split_word(line.trim_end());
        let command = match word {
            "" => return Ok(None),
            "connect" => {
                let (url, rest) = split_word(rest);
                let (client_id, _) = split_word(rest);
                Command::Connect {
                    url: optional(url),
                    client_id: optional(client_id),
                }
            }
            "disconnect" => Command::Disconnect,
            // blank topics are rejected by the session itself
            "sub" => Command::Subscribe(rest.to_string()),
            "unsub" => Command::Unsubscribe(rest.to_string()),
            "topics" => Command::Topics,
            "pub" => publish(rest, false),
            "pubjson" => publish(rest, true),
            "template" => {
                let (template, recipient) = template("template", rest)?;
                Command::ShowTemplate { template, recipient }
            }
            "send" => {
                let (template, recipient) = template("send", rest)?;
                Command::SendTemplate { template, recipient }
            }
            "filter" => Command::Filter(rest.to_string()),
            "dedup" => Command::Dedup(switch(rest)?),
            "follow" => Command::Follow(switch(rest)?),
            "cap" => match rest {
                "" => {
                    return Err(CommandError::MissingArgument {
                        command: "cap",
                        argument: "a message count or off",
                    })
                }
                "off" | "0" => Command::Cap(None),
                n => Command::Cap(Some(
                    n.parse()
                        .map_err(|_| CommandError::InvalidCap(n.to_string()))?,
                )),
            },
            "show" => Command::Show,
            "clear" => Command::Clear,
            "status" => Command::Status,
            "error" => Command::Error,
            "clear-error" => Command::ClearError,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)?.ok_or_else(|| CommandError::Unknown(String::new()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue(Vec<String>),
    Quit,
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

pub struct Console<C: WireConnector> {
    session: Session<C>,
    config: ConsoleConfig,
    filter: ViewFilter,
    follow: bool,
    topics: TopicScheme,
    // dedup state of the logged arrivals that match the topic filter
    echo_window: DuplicateWindow,
}

impl<C: WireConnector> Console<C> {
    pub fn new(session: Session<C>, config: ConsoleConfig) -> Self {
        let filter = session
            .settings()
            .view_filter(&config.view.topic_filter, config.view.suppress_duplicates);
        Self {
            session,
            echo_window: DuplicateWindow::new(filter.duplicate_window),
            filter,
            follow: config.view.follow,
            topics: TopicScheme::new(&config.protocol.namespace),
            config,
        }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn handle_line(&mut self, line: &str) -> Flow {
        match Command::parse(line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => Flow::Continue(Vec::new()),
            Err(e) => Flow::Continue(vec![e.to_string()]),
        }
    }

    pub fn execute(&mut self, command: Command) -> Flow {
        debug!("Executing {:?}", command);
        let mut out = Vec::new();
        match command {
            Command::Connect { url, client_id } => {
                let url = url.unwrap_or_else(|| self.config.broker_url().to_string());
                let client_id = client_id.unwrap_or_else(|| self.config.client_id().to_string());
                self.session.connect(&url, &client_id);
                if let (Some(endpoint), Some(client_id)) =
                    (self.session.endpoint(), self.session.client_id())
                {
                    out.push(format!("connecting to {endpoint} as {client_id}"));
                }
                self.push_error(&mut out);
            }
            Command::Disconnect => {
                self.session.disconnect();
                self.resync_echo();
                out.push("disconnected".to_string());
                self.push_error(&mut out);
            }
            Command::Subscribe(topic) => {
                self.session.subscribe(&topic);
                if self.session.last_error().is_none() {
                    out.push(format!("subscribed to {topic}"));
                }
                self.push_error(&mut out);
            }
            Command::Unsubscribe(topic) => {
                let was_subscribed = self.session.subscribed_topics().contains(&topic);
                self.session.unsubscribe(&topic);
                if was_subscribed && self.session.last_error().is_none() {
                    out.push(format!("unsubscribed from {topic}"));
                }
                self.push_error(&mut out);
            }
            Command::Topics => {
                if self.session.subscribed_topics().is_empty() {
                    out.push("no subscriptions".to_string());
                }
                out.extend(self.session.subscribed_topics().iter().cloned());
            }
            Command::Publish {
                topic,
                payload,
                retained,
                json,
            } => {
                if json
                    && !payload.trim().is_empty()
                    && serde_json::from_str::<serde_json::Value>(&payload).is_err()
                {
                    out.push("Invalid JSON format".to_string());
                } else {
                    self.publish(&topic, &payload, retained, &mut out);
                }
            }
            Command::ShowTemplate {
                template,
                recipient,
            } => {
                let (topic, message) = self.build_template(template, recipient);
                out.push(format!("topic: {topic}"));
                out.push(message.to_json_pretty());
            }
            Command::SendTemplate {
                template,
                recipient,
            } => {
                let (topic, message) = self.build_template(template, recipient);
                self.publish(&topic, &message.to_json_pretty(), false, &mut out);
            }
            Command::Filter(text) => {
                if text.is_empty() {
                    out.push("topic filter cleared".to_string());
                } else {
                    out.push(format!("showing topics containing \"{text}\""));
                }
                self.filter.topic_filter = text;
                self.resync_echo();
            }
            Command::Dedup(enabled) => {
                self.filter.suppress_duplicates = enabled;
                self.resync_echo();
                out.push(format!("duplicate suppression {}", on_off(enabled)));
            }
            Command::Cap(cap) => {
                self.filter.display_cap = cap;
                match cap {
                    Some(n) => out.push(format!("showing at most {n} messages")),
                    None => out.push("showing all messages".to_string()),
                }
            }
            Command::Follow(enabled) => {
                self.follow = enabled;
                out.push(format!("follow {}", on_off(enabled)));
            }
            Command::Show => {
                let view = self.session.view(&self.filter);
                out.extend(view.entries.iter().map(|shown| shown.render()));
                out.push(view.summary());
            }
            Command::Clear => {
                self.session.clear_messages();
                self.resync_echo();
                out.push("message log cleared".to_string());
            }
            Command::Status => out.extend(self.status()),
            Command::Error => match self.session.last_error() {
                Some(e) => out.push(e.to_string()),
                None => out.push("no error".to_string()),
            },
            Command::ClearError => self.session.clear_error(),
            Command::Help => out.push(HELP.to_string()),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue(out)
    }

    /// Applies a wire event to the session and describes what changed.
    pub fn handle_event(&mut self, event: WireEvent) -> Vec<String> {
        let mut out = Vec::new();
        let kind = match &event.kind {
            WireEventKind::MessageArrived(_) => None,
            other => Some(other.clone()),
        };
        if !self.session.apply_event(event) {
            return out;
        }

        match kind {
            None => {
                if let Some(line) = self.live_echo() {
                    out.push(line);
                }
            }
            Some(WireEventKind::Connected) => {
                out.push("connected".to_string());
                let subscriptions = self.config.broker.subscriptions.clone();
                for topic in subscriptions {
                    self.session.subscribe(&topic);
                    match self.session.last_error() {
                        None => out.push(format!("subscribed to {topic}")),
                        Some(e) => out.push(format!("error: {e}")),
                    }
                }
            }
            Some(WireEventKind::Reconnected) => {
                out.push("reconnected, subscriptions must be renewed".to_string())
            }
            Some(_) => self.push_error(&mut out),
        }
        out
    }

    /// Disconnects if a session is still open.
    pub fn shutdown(&mut self) {
        if self.session.endpoint().is_some() {
            info!("Closing MQTT session before exit");
            self.session.disconnect();
        }
    }

    fn publish(&mut self, topic: &str, payload: &str, retained: bool, out: &mut Vec<String>) {
        self.session.publish(topic, payload, retained);
        if self.session.last_error().is_none() {
            out.push(format!("published to {topic}"));
        }
        self.push_error(out);
    }

    fn build_template(
        &self,
        template: Template,
        recipient: Option<String>,
    ) -> (String, crate::protocol::ThatsAppMessage) {
        let recipient = recipient.unwrap_or_else(|| self.config.protocol.recipient_id.clone());
        let message = template.build(&self.config.protocol.sender_id, &recipient);
        (self.topics.topic_for(template.0, &recipient), message)
    }

    /// Renders the newest arrival if `show` would list it. Only that entry is
    /// checked, against the running dedup state.
    fn live_echo(&mut self) -> Option<String> {
        let newest = self.session.messages().last()?;
        if !self.filter.matches_topic(newest.topic()) {
            return None;
        }
        if self.filter.suppress_duplicates && !self.echo_window.admit(newest) {
            return None;
        }
        if !self.follow {
            return None;
        }
        let shown = DisplayedMessage {
            entry: newest,
            classification: classify(newest.parsed()),
        };
        Some(shown.render())
    }

    /// Rebuilds the dedup state from the log after the log or the view changed.
    fn resync_echo(&mut self) {
        self.echo_window = DuplicateWindow::new(self.filter.duplicate_window);
        if !self.filter.suppress_duplicates {
            return;
        }
        for entry in self.session.messages() {
            if self.filter.matches_topic(entry.topic()) {
                self.echo_window.admit(entry);
            }
        }
    }

    fn status(&self) -> Vec<String> {
        let session = &self.session;
        let cap = match self.filter.display_cap {
            Some(n) => n.to_string(),
            None => "off".to_string(),
        };
        vec![
            format!("state: {:?}", session.state()),
            format!(
                "broker: {}",
                session
                    .endpoint()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string())
            ),
            format!("client id: {}", session.client_id().unwrap_or("-")),
            format!("subscriptions: {}", session.subscribed_topics().len()),
            format!("messages logged: {}", session.messages().len()),
            format!(
                "view: filter \"{}\", dedup {}, cap {}, follow {}",
                self.filter.topic_filter,
                on_off(self.filter.suppress_duplicates),
                cap,
                on_off(self.follow)
            ),
        ]
    }

    fn push_error(&self, out: &mut Vec<String>) {
        if let Some(e) = self.session.last_error() {
            out.push(format!("error: {e}"));
        }
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

/// Drives the console until `quit` or end of input.
pub async fn run<C: WireConnector>(
    mut console: Console<C>,
    mut events: SessionEvents,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("ThatsApp MQTT debugger, type `help` for commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.map_err(|e| eyre!("Failed to read from stdin: {}", e))? else {
                    info!("Input closed, shutting down");
                    break;
                };
                match console.handle_line(&line) {
                    Flow::Continue(out) => print_lines(&out),
                    Flow::Quit => break,
                }
            }
            Some(event) = events.recv() => print_lines(&console.handle_event(event)),
        }
    }

    console.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::config::SessionSettings;
    use crate::mqtt::wire::mock::{MockConnector, WireCall};
    use crate::protocol::MessageKind;

    fn console(config: ConsoleConfig) -> (Console<MockConnector>, SessionEvents, MockConnector) {
        let connector = MockConnector::default();
        let (session, events) = Session::new(connector.clone(), SessionSettings::default());
        (Console::new(session, config), events, connector)
    }

    fn lines(flow: Flow) -> Vec<String> {
        match flow {
            Flow::Continue(out) => out,
            Flow::Quit => panic!("unexpected quit"),
        }
    }

    fn drain(console: &mut Console<MockConnector>, events: &mut SessionEvents) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(event) = events.try_recv() {
            out.extend(console.handle_event(event));
        }
        out
    }

    fn connected(
        config: ConsoleConfig,
    ) -> (Console<MockConnector>, SessionEvents, MockConnector) {
        let (mut console, mut events, wire) = console(config);
        console.handle_line("connect ws://localhost:9001/mqtt tester");
        wire.complete_connect();
        drain(&mut console, &mut events);
        assert!(console.session().is_connected());
        (console, events, wire)
    }

    #[test]
    fn parses_publish_with_retained_flag_and_spaces() {
        assert_eq!(
            Command::parse("pub -r a/b hello   world").unwrap(),
            Some(Command::Publish {
                topic: "a/b".into(),
                payload: "hello   world".into(),
                retained: true,
                json: false,
            })
        );
        assert_eq!(
            "pubjson a/b {\"x\": 1}".parse::<Command>().unwrap(),
            Command::Publish {
                topic: "a/b".into(),
                payload: "{\"x\": 1}".into(),
                retained: false,
                json: true,
            }
        );
    }

    #[test]
    fn parse_errors_are_reported() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(
            Command::parse("frobnicate"),
            Err(CommandError::Unknown("frobnicate".into()))
        );
        assert_eq!(
            Command::parse("dedup maybe"),
            Err(CommandError::InvalidSwitch("maybe".into()))
        );
        assert_eq!(
            Command::parse("cap lots"),
            Err(CommandError::InvalidCap("lots".into()))
        );
        assert!(matches!(
            Command::parse("send SHOUT"),
            Err(CommandError::UnknownKind(_))
        ));
        assert!(matches!(
            Command::parse("template"),
            Err(CommandError::MissingArgument { .. })
        ));
    }

    #[test]
    fn parses_template_kinds_case_insensitively() {
        assert_eq!(
            Command::parse("send profile_update bob").unwrap(),
            Some(Command::SendTemplate {
                template: Template(MessageKind::ProfileUpdate),
                recipient: Some("bob".into()),
            })
        );
        assert_eq!(Command::parse("cap off").unwrap(), Some(Command::Cap(None)));
        assert_eq!(Command::parse("cap 20").unwrap(), Some(Command::Cap(Some(20))));
    }

    #[test]
    fn connect_uses_config_defaults() {
        let (mut console, _events, wire) = console(ConsoleConfig::default());
        let out = lines(console.handle_line("connect"));
        let created = wire.created();
        let (endpoint, client_id) = &created[0];
        assert_eq!(endpoint.websocket_url(), "ws://broker.hivemq.com:8000/mqtt");
        assert!(client_id.starts_with("thatsapp-debugger-"));
        assert!(out[0].starts_with("connecting to broker.hivemq.com:8000/mqtt as"));
    }

    #[test]
    fn invalid_address_prints_the_error() {
        let (mut console, _events, _wire) = console(ConsoleConfig::default());
        let out = lines(console.handle_line("connect not-a-url"));
        assert_eq!(out, ["error: Invalid broker URL. Please enter a valid URL."]);
    }

    #[test]
    fn configured_subscriptions_follow_a_successful_connect() {
        let (mut console, mut events, wire) = console(ConsoleConfig::default());
        console.handle_line("connect ws://localhost:9001 tester");
        wire.complete_connect();
        let out = drain(&mut console, &mut events);

        assert_eq!(out, ["connected", "subscribed to thatsapp/publictest/#"]);
        assert!(wire
            .calls()
            .contains(&WireCall::Subscribe("thatsapp/publictest/#".into())));
    }

    #[test]
    fn arrivals_are_echoed_when_followed_and_matching() {
        let mut config = ConsoleConfig::default();
        config.broker.subscriptions.clear();
        let (mut console, mut events, wire) = connected(config);

        wire.deliver("thatsapp/publictest/global", r#"{"type":"ONLINE_POLL"}"#, false);
        let out = drain(&mut console, &mut events);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("[ONLINE_POLL] thatsapp/publictest/global"));

        // duplicate inside the window is not echoed
        wire.deliver("thatsapp/publictest/global", r#"{"type":"ONLINE_POLL"}"#, false);
        assert!(drain(&mut console, &mut events).is_empty());

        console.handle_line("filter bob");
        wire.deliver("thatsapp/publictest/alice/messages", "hi", false);
        assert!(drain(&mut console, &mut events).is_empty());

        console.handle_line("follow off");
        wire.deliver("thatsapp/publictest/bob/messages", "hi", false);
        assert!(drain(&mut console, &mut events).is_empty());
        assert_eq!(console.session().messages().len(), 4);
    }

    #[test]
    fn echo_agrees_with_show_after_the_view_changes() {
        let mut config = ConsoleConfig::default();
        config.broker.subscriptions.clear();
        config.view.topic_filter = "bob".into();
        let (mut console, mut events, wire) = connected(config);

        // filtered out, so not part of the dedup state yet
        wire.deliver("a/alice", "ping", false);
        assert!(drain(&mut console, &mut events).is_empty());

        console.handle_line("filter");
        wire.deliver("a/alice", "ping", false);
        assert!(drain(&mut console, &mut events).is_empty());
        let shown = lines(console.handle_line("show"));
        assert_eq!(shown.last().unwrap(), "1 of 2 messages (1 duplicates filtered out)");

        console.handle_line("clear");
        wire.deliver("a/alice", "ping", false);
        assert_eq!(drain(&mut console, &mut events).len(), 1);

        console.handle_line("dedup off");
        wire.deliver("a/alice", "ping", false);
        assert_eq!(drain(&mut console, &mut events).len(), 1);
    }

    #[test]
    fn echo_keeps_dedup_state_while_follow_is_off() {
        let mut config = ConsoleConfig::default();
        config.broker.subscriptions.clear();
        let (mut console, mut events, wire) = connected(config);

        console.handle_line("follow off");
        wire.deliver("a/b", "same", false);
        assert!(drain(&mut console, &mut events).is_empty());
        console.handle_line("follow on");
        wire.deliver("a/b", "same", false);
        assert!(drain(&mut console, &mut events).is_empty());
    }

    #[test]
    fn pubjson_rejects_invalid_json_without_publishing() {
        let (mut console, _events, wire) = connected(ConsoleConfig::default());
        let out = lines(console.handle_line("pubjson a/b {not json"));
        assert_eq!(out, ["Invalid JSON format"]);
        assert!(wire.sends().is_empty());

        let out = lines(console.handle_line("pubjson -r a/b {\"ok\": true}"));
        assert_eq!(out, ["published to a/b"]);
        assert!(wire.sends()[0].retained);
    }

    #[test]
    fn publish_errors_come_from_the_session() {
        let (mut console, _events, _wire) = console(ConsoleConfig::default());
        let out = lines(console.handle_line("pub a/b hello"));
        assert_eq!(out, ["error: Not connected to MQTT broker"]);
        let out = lines(console.handle_line("error"));
        assert_eq!(out, ["Not connected to MQTT broker"]);
        console.handle_line("clear-error");
        assert_eq!(lines(console.handle_line("error")), ["no error"]);
    }

    #[test]
    fn send_publishes_template_to_its_topic() {
        let (mut console, _events, wire) = connected(ConsoleConfig::default());
        console.handle_line("send text bob");
        console.handle_line("send online_poll");

        let sends = wire.sends();
        assert_eq!(sends[0].destination_name, "thatsapp/publictest/bob/messages");
        let sent: serde_json::Value = serde_json::from_str(&sends[0].payload_string).unwrap();
        assert_eq!(sent["type"], "TEXT");
        assert_eq!(sent["senderId"], "debugger");
        assert_eq!(sent["recipientId"], "bob");
        assert_eq!(sends[1].destination_name, "thatsapp/publictest/global");
    }

    #[test]
    fn template_prints_topic_and_json() {
        let (mut console, _events, wire) = console(ConsoleConfig::default());
        let out = lines(console.handle_line("template location"));
        assert_eq!(out[0], "topic: thatsapp/publictest/recipient/messages");
        assert!(out[1].contains("\"LOCATION\""));
        assert!(wire.sends().is_empty());
    }

    #[test]
    fn show_applies_view_settings() {
        let mut config = ConsoleConfig::default();
        config.broker.subscriptions.clear();
        let (mut console, mut events, wire) = connected(config);
        for n in 0..3 {
            wire.deliver("a/b", &n.to_string(), false);
        }
        wire.deliver("a/b", "2", false);
        drain(&mut console, &mut events);

        let out = lines(console.handle_line("show"));
        assert_eq!(out.last().unwrap(), "3 of 4 messages (1 duplicates filtered out)");

        console.handle_line("dedup off");
        console.handle_line("cap 2");
        let out = lines(console.handle_line("show"));
        assert_eq!(out.len(), 3);
        assert_eq!(out.last().unwrap(), "2 of 4 messages (2 older hidden)");
    }

    #[test]
    fn connection_loss_is_reported() {
        let (mut console, mut events, wire) = connected(ConsoleConfig::default());
        wire.lose_connection("socket closed");
        let out = drain(&mut console, &mut events);
        assert_eq!(out, ["error: Connection lost: socket closed"]);
        assert_eq!(lines(console.handle_line("topics")), ["no subscriptions"]);
    }

    #[test]
    fn quit_ends_the_loop() {
        let (mut console, _events, _wire) = console(ConsoleConfig::default());
        assert_eq!(console.handle_line("quit"), Flow::Quit);
        assert_eq!(
            lines(console.handle_line("nope")),
            ["unknown command: nope (try `help`)"]
        );
    }
}

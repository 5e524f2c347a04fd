//! Supervisor - lifecycle state machine for the backend and browser processes
//!
//! A single control loop ([`Supervisor::run`]) owns both [`SupervisedProcess`]
//! records and is the only writer of their state. Everything that can change
//! state arrives as a [`Message`] (process events, termination and probe
//! completions) or a [`SupervisorCommand`], and is applied in arrival order.
//!
//! Per process instance there is one forwarding task that moves the
//! instance's [`ProcessEvent`]s into the control queue, preserving line order.
//! Stopping hands the [`ProcessHandle`] to a termination task; the process is
//! only restarted after that task reports its death.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::command::{CommandHandle, SupervisorCommand};
use crate::config::Settings;
use crate::message::Message;
use crate::sink::EventSink;
use tandem_core::prelude::*;
use tandem_core::router::{self, route};
use tandem_core::{
    OutputEvent, OutputKind, ProcessEvent, ProcessName, ProcessState, ReadinessDetector,
};
use tandem_process::{wait_until_accepting, LaunchCommand, ProcessHandle, ProcessOutput};

/// Capacity of the control queue shared by all forwarding tasks
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Everything the supervisor needs to know up front
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub backend: LaunchCommand,
    pub browser: LaunchCommand,
    pub detector: ReadinessDetector,
    /// Confirm readiness with a TCP probe bounded by this timeout
    pub probe_timeout: Option<Duration>,
    /// SIGTERM to SIGKILL delay when stopping a process
    pub grace: Duration,
}

impl SupervisorConfig {
    pub fn new(backend: LaunchCommand, browser: LaunchCommand) -> Self {
        Self {
            backend,
            browser,
            detector: ReadinessDetector::default(),
            probe_timeout: None,
            grace: Duration::from_secs(2),
        }
    }

    /// Validate settings and build the launch commands
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            backend: settings.launch_command(ProcessName::Backend)?,
            browser: settings.launch_command(ProcessName::Browser)?,
            detector: settings.readiness.detector(),
            probe_timeout: settings
                .readiness
                .probe
                .then(|| settings.readiness.probe_timeout()),
            grace: settings.shutdown.grace(),
        })
    }

    pub fn with_detector(mut self, detector: ReadinessDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_probe(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

/// One of the two supervised child processes
#[derive(Debug)]
pub struct SupervisedProcess {
    name: ProcessName,
    state: ProcessState,
    command: LaunchCommand,
    /// Present while Starting or Running; a termination task owns it while Stopping
    handle: Option<ProcessHandle>,
    /// Write-once per instance, backend only
    ready_url: Option<String>,
    /// Incremented on every spawn attempt
    instance: u64,
    pending_restart: bool,
    probe_in_flight: bool,
}

impl SupervisedProcess {
    fn new(name: ProcessName, command: LaunchCommand) -> Self {
        Self {
            name,
            state: ProcessState::NotStarted,
            command,
            handle: None,
            ready_url: None,
            instance: 0,
            pending_restart: false,
            probe_in_flight: false,
        }
    }

    pub fn name(&self) -> ProcessName {
        self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn command(&self) -> &LaunchCommand {
        &self.command
    }

    pub fn ready_url(&self) -> Option<&str> {
        self.ready_url.as_deref()
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|h| h.id())
    }
}

/// Process supervisor and readiness orchestrator
pub struct Supervisor {
    backend: SupervisedProcess,
    browser: SupervisedProcess,
    detector: ReadinessDetector,
    probe_timeout: Option<Duration>,
    grace: Duration,

    sink: Box<dyn EventSink>,

    msg_tx: mpsc::Sender<Message>,
    msg_rx: mpsc::Receiver<Message>,
    cmd_tx: mpsc::UnboundedSender<SupervisorCommand>,
    cmd_rx: mpsc::UnboundedReceiver<SupervisorCommand>,

    shutting_down: bool,
    finished: bool,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, sink: Box<dyn EventSink>) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        Self {
            backend: SupervisedProcess::new(ProcessName::Backend, config.backend),
            browser: SupervisedProcess::new(ProcessName::Browser, config.browser),
            detector: config.detector,
            probe_timeout: config.probe_timeout,
            grace: config.grace,
            sink,
            msg_tx,
            msg_rx,
            cmd_tx,
            cmd_rx,
            shutting_down: false,
            finished: false,
        }
    }

    /// A handle for issuing commands to this supervisor
    pub fn commands(&self) -> CommandHandle {
        CommandHandle::new(self.cmd_tx.clone())
    }

    pub fn process(&self, name: ProcessName) -> &SupervisedProcess {
        match name {
            ProcessName::Backend => &self.backend,
            ProcessName::Browser => &self.browser,
        }
    }

    fn process_mut(&mut self, name: ProcessName) -> &mut SupervisedProcess {
        match name {
            ProcessName::Backend => &mut self.backend,
            ProcessName::Browser => &mut self.browser,
        }
    }

    pub fn state(&self, name: ProcessName) -> ProcessState {
        self.process(name).state
    }

    pub fn ready_url(&self) -> Option<&str> {
        self.backend.ready_url()
    }

    /// Human-readable launch command, for display only
    pub fn command_display(&self, name: ProcessName) -> String {
        self.process(name).command.display()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    // ─────────────────────────────────────────────────────────
    // Control Loop
    // ─────────────────────────────────────────────────────────

    /// Drain messages and commands until a shutdown completes.
    pub async fn run(mut self) -> Result<()> {
        info!("Supervisor control loop started");
        while !self.finished {
            self.step().await;
        }
        info!("Supervisor control loop finished");
        Ok(())
    }

    /// Wait for the next message or command and apply it.
    async fn step(&mut self) {
        tokio::select! {
            Some(command) = self.cmd_rx.recv() => self.handle_command(command),
            Some(msg) = self.msg_rx.recv() => self.process_message(msg),
        }
    }

    /// Stop both processes concurrently and wait until both are confirmed dead.
    pub async fn shutdown(&mut self) {
        self.begin_shutdown();
        while !self.finished {
            self.step().await;
        }
    }

    fn handle_command(&mut self, command: SupervisorCommand) {
        debug!("Command: {:?}", command);
        match command {
            SupervisorCommand::Restart(name) => {
                if self.shutting_down {
                    debug!("Ignoring restart of {} during shutdown", name);
                    return;
                }
                if let Err(e) = self.restart(name) {
                    // Launch failures were already reported through the sink
                    if e.is_recoverable() {
                        warn!("Restart of {} failed: {}", name, e);
                    } else {
                        error!("Restart of {} failed: {}", name, e);
                    }
                }
            }
            SupervisorCommand::Shutdown => self.begin_shutdown(),
        }
    }

    /// Apply one message from the control queue
    pub fn process_message(&mut self, msg: Message) {
        trace!("Message: {}", msg.label());
        match msg {
            Message::Process {
                name,
                instance,
                event,
            } => self.handle_process_event(name, instance, event),
            Message::Terminated {
                name,
                instance,
                code,
            } => self.handle_terminated(name, instance, code),
            Message::ProbeFinished {
                instance,
                url,
                result,
            } => self.handle_probe_finished(instance, url, result),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────

    /// Spawn `name`. Valid only from NotStarted, Stopped or Failed.
    ///
    /// A launch failure leaves the process Failed, is reported to the sink as
    /// an error line, and is returned.
    pub fn start(&mut self, name: ProcessName) -> Result<()> {
        self.transition(name, ProcessState::Starting)?;

        let msg_tx = self.msg_tx.clone();
        let process = self.process_mut(name);
        process.instance += 1;
        process.ready_url = None;
        process.probe_in_flight = false;
        process.pending_restart = false;
        let instance = process.instance;

        match ProcessHandle::spawn(&process.command) {
            Ok((handle, output)) => {
                info!(
                    "{} instance {} started (PID {:?})",
                    name,
                    instance,
                    handle.id()
                );
                process.handle = Some(handle);
                spawn_forwarder(name, instance, output, msg_tx);

                self.sink.on_started(name);
                self.announce(name, router::started_text(name));
                Ok(())
            }
            Err(e) => {
                error!("Failed to start {}: {}", name, e);
                self.transition(name, ProcessState::Failed)?;
                let reason = e.to_string();
                self.sink.on_output(&OutputEvent::new(
                    name,
                    OutputKind::Error,
                    router::launch_failed_text(name, &reason),
                ));
                Err(e)
            }
        }
    }

    /// Stop `name` if alive, then start it again once its death is confirmed.
    ///
    /// Requests arriving while a restart is in flight are coalesced.
    pub fn restart(&mut self, name: ProcessName) -> Result<()> {
        match self.state(name) {
            ProcessState::NotStarted | ProcessState::Stopped | ProcessState::Failed => {
                self.start(name)
            }
            ProcessState::Starting | ProcessState::Running => {
                self.announce(name, router::restarting_text(name));
                self.process_mut(name).pending_restart = true;
                self.begin_stop(name)
            }
            ProcessState::Stopping => {
                debug!("{} restart already in progress, coalescing", name);
                self.process_mut(name).pending_restart = true;
                Ok(())
            }
        }
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        info!("Shutting down supervised processes");
        self.shutting_down = true;

        for name in ProcessName::ALL {
            self.process_mut(name).pending_restart = false;
            if matches!(
                self.state(name),
                ProcessState::Starting | ProcessState::Running
            ) {
                if let Err(e) = self.begin_stop(name) {
                    warn!("Failed to stop {}: {}", name, e);
                }
            }
        }

        self.check_shutdown_complete();
    }

    /// Move `name` to Stopping and hand its handle to a termination task.
    fn begin_stop(&mut self, name: ProcessName) -> Result<()> {
        self.transition(name, ProcessState::Stopping)?;

        let grace = self.grace;
        let msg_tx = self.msg_tx.clone();
        let process = self.process_mut(name);
        let instance = process.instance;

        match process.handle.take() {
            Some(mut handle) => {
                tokio::spawn(async move {
                    if let Err(e) = handle.terminate(grace).await {
                        warn!("Terminating {} failed: {}", name, e);
                    }
                    let code = handle.exit_code();
                    let _ = msg_tx
                        .send(Message::Terminated {
                            name,
                            instance,
                            code,
                        })
                        .await;
                });
            }
            None => {
                warn!("{} had no process handle while stopping", name);
                self.handle_terminated(name, instance, None);
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Message Handlers
    // ─────────────────────────────────────────────────────────

    fn handle_process_event(&mut self, name: ProcessName, instance: u64, event: ProcessEvent) {
        let current = self.process(name).instance == instance;

        match event {
            ProcessEvent::Line { stream, text } => {
                if current && self.state(name) == ProcessState::Starting {
                    let _ = self.transition(name, ProcessState::Running);
                }

                self.sink.on_output(&route(name, stream, text.as_str()));

                // A backend that is being stopped can no longer become ready
                if current
                    && name == ProcessName::Backend
                    && matches!(
                        self.state(name),
                        ProcessState::Starting | ProcessState::Running
                    )
                {
                    self.check_readiness(instance, &text);
                }
            }
            ProcessEvent::StreamError { stream, message } => {
                self.sink
                    .on_output(&router::stream_error(name, stream, &message));
            }
            ProcessEvent::Exited { code, requested } => {
                if !current {
                    return;
                }
                match self.state(name) {
                    ProcessState::Starting | ProcessState::Running => {
                        // Only a terminate request is a planned exit, and that
                        // always passes through Stopping first.
                        debug!(
                            "{} instance {} exited unexpectedly (code {:?}, requested {})",
                            name, instance, code, requested
                        );
                        self.process_mut(name).handle = None;
                        let _ = self.transition(name, ProcessState::Failed);
                        self.announce(name, router::exited_text(name, code));
                        self.sink.on_exited(name, code);
                    }
                    _ => trace!("{} exit handled by termination task", name),
                }
            }
        }
    }

    fn handle_terminated(&mut self, name: ProcessName, instance: u64, code: Option<i32>) {
        let process = self.process(name);
        if process.instance != instance || process.state != ProcessState::Stopping {
            debug!("Stale termination report for {} instance {}", name, instance);
            return;
        }

        debug!("{} instance {} terminated (code {:?})", name, instance, code);
        let _ = self.transition(name, ProcessState::Stopped);
        self.announce(name, router::stopped_text(name));

        if self.shutting_down {
            self.check_shutdown_complete();
            return;
        }

        if std::mem::take(&mut self.process_mut(name).pending_restart) {
            if let Err(e) = self.start(name) {
                warn!("Restart of {} failed: {}", name, e);
            }
        }
    }

    fn check_readiness(&mut self, instance: u64, line: &str) {
        if self.backend.ready_url.is_some() || self.backend.probe_in_flight {
            return;
        }
        let Some(signal) = self.detector.detect(line) else {
            return;
        };
        let url = signal.into_url(self.detector.default_url());

        match self.probe_timeout {
            None => self.declare_ready(url),
            Some(timeout) => {
                debug!("Probing {} before declaring ready", url);
                self.backend.probe_in_flight = true;
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let result = wait_until_accepting(&url, timeout)
                        .await
                        .map_err(|e| e.to_string());
                    let _ = msg_tx
                        .send(Message::ProbeFinished {
                            instance,
                            url,
                            result,
                        })
                        .await;
                });
            }
        }
    }

    fn handle_probe_finished(
        &mut self,
        instance: u64,
        url: String,
        result: std::result::Result<(), String>,
    ) {
        if self.backend.instance != instance {
            debug!("Discarding probe result for old backend instance {}", instance);
            return;
        }
        self.backend.probe_in_flight = false;

        if self.backend.ready_url.is_some()
            || !matches!(
                self.backend.state,
                ProcessState::Starting | ProcessState::Running
            )
        {
            return;
        }

        if let Err(reason) = result {
            warn!("Readiness probe failed: {}", reason);
            self.announce(
                ProcessName::Backend,
                format!("Readiness probe failed ({}), assuming ready", reason),
            );
        }
        self.declare_ready(url);
    }

    /// Cache the URL, announce it once, and start the browser if needed.
    fn declare_ready(&mut self, url: String) {
        info!("Backend ready at {}", url);
        self.backend.ready_url = Some(url.clone());
        self.announce(ProcessName::Backend, router::ready_text(&url));
        self.sink.on_ready(&url);

        if !self.shutting_down && self.browser.state == ProcessState::NotStarted {
            if let Err(e) = self.start(ProcessName::Browser) {
                warn!("Browser auto-start failed: {}", e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────

    /// Move `name` to `to`, rejecting edges outside the lifecycle graph.
    fn transition(&mut self, name: ProcessName, to: ProcessState) -> Result<()> {
        let from = self.state(name);
        if !from.can_transition_to(to) {
            warn!("Rejected transition for {}: {} -> {}", name, from, to);
            return Err(Error::InvalidTransition { name, from, to });
        }

        self.process_mut(name).state = to;
        debug!("{}: {} -> {}", name, from, to);
        self.sink.on_state_changed(name, from, to);
        Ok(())
    }

    fn announce(&mut self, name: ProcessName, text: String) {
        self.sink.on_output(&router::info(name, text));
    }

    fn check_shutdown_complete(&mut self) {
        if self.shutting_down
            && ProcessName::ALL
                .iter()
                .all(|&name| self.state(name) != ProcessState::Stopping)
        {
            info!("All supervised processes stopped");
            self.finished = true;
        }
    }
}

/// Move one instance's events into the control queue, in order.
fn spawn_forwarder(
    name: ProcessName,
    instance: u64,
    mut output: ProcessOutput,
    msg_tx: mpsc::Sender<Message>,
) {
    tokio::spawn(async move {
        while let Some(event) = output.recv().await {
            let msg = Message::Process {
                name,
                instance,
                event,
            };
            if msg_tx.send(msg).await.is_err() {
                debug!("Supervisor gone, dropping {} output", name);
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use proptest::prelude::*;
    use std::time::Instant;
    use tandem_core::{LifecycleEvent, StreamKind, SupervisorEvent};
    use tandem_process::test_utils::{idle, missing_program, ready_backend, sh, stubborn};
    use tokio::sync::mpsc::UnboundedReceiver;

    const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

    fn supervisor(config: SupervisorConfig) -> (Supervisor, UnboundedReceiver<SupervisorEvent>) {
        let (sink, rx) = ChannelSink::new();
        (Supervisor::new(config, Box::new(sink)), rx)
    }

    /// Receive events until one matches `pred`; returns everything seen.
    async fn wait_for(
        rx: &mut UnboundedReceiver<SupervisorEvent>,
        pred: impl Fn(&SupervisorEvent) -> bool,
    ) -> Vec<SupervisorEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out; events so far: {:#?}", seen))
                .unwrap_or_else(|| panic!("sink closed; events so far: {:#?}", seen));
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Drain the sink until the supervisor is dropped.
    async fn drain(rx: &mut UnboundedReceiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
        let mut seen = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(EVENT_TIMEOUT, rx.recv()).await {
            seen.push(event);
        }
        seen
    }

    fn is_state(event: &SupervisorEvent, name: ProcessName, state: ProcessState) -> bool {
        matches!(
            event,
            SupervisorEvent::Lifecycle(LifecycleEvent::StateChanged { source, to, .. })
                if *source == name && *to == state
        )
    }

    fn count(events: &[SupervisorEvent], pred: impl Fn(&SupervisorEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    fn is_started(event: &SupervisorEvent, name: ProcessName) -> bool {
        *event == SupervisorEvent::Lifecycle(LifecycleEvent::Started { source: name })
    }

    fn is_ready(event: &SupervisorEvent) -> bool {
        matches!(event, SupervisorEvent::Lifecycle(LifecycleEvent::Ready { .. }))
    }

    fn output_texts(events: &[SupervisorEvent], name: ProcessName) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SupervisorEvent::Output(o) if o.source == name => Some(o.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_config_from_settings_requires_commands() {
        let err = SupervisorConfig::from_settings(&Settings::default()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.backend = crate::config::ProcessSettings::from_command("python -m server");
        settings.browser = crate::config::ProcessSettings::from_command("chromium");
        settings.readiness.probe = true;
        settings.shutdown.grace_ms = 750;

        let config = SupervisorConfig::from_settings(&settings).unwrap();
        assert_eq!(config.backend.program(), "python");
        assert_eq!(config.probe_timeout, Some(Duration::from_millis(5000)));
        assert_eq!(config.grace, Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_initial_state_and_display() {
        let config = SupervisorConfig::new(
            LaunchCommand::new("python").arg("main.py"),
            LaunchCommand::new("chromium").with_display("Chromium"),
        );
        let (sup, _rx) = supervisor(config);

        for name in ProcessName::ALL {
            assert_eq!(sup.state(name), ProcessState::NotStarted);
        }
        assert_eq!(sup.ready_url(), None);
        assert_eq!(sup.command_display(ProcessName::Backend), "python main.py");
        assert_eq!(sup.command_display(ProcessName::Browser), "Chromium");
    }

    #[tokio::test]
    async fn test_launch_failure_parks_process_in_failed() {
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(missing_program(), idle("b")));

        let err = sup.start(ProcessName::Backend).unwrap_err();
        assert!(err.is_launch_error());
        assert_eq!(sup.state(ProcessName::Backend), ProcessState::Failed);

        let events = wait_for(&mut rx, |e| is_state(e, ProcessName::Backend, ProcessState::Failed)).await;
        assert_eq!(count(&events, |e| is_started(e, ProcessName::Backend)), 0);

        let error_line = rx.try_recv().unwrap();
        match error_line {
            SupervisorEvent::Output(o) => {
                assert_eq!(o.kind, OutputKind::Error);
                assert!(o.text.starts_with("Failed to start Backend process:"));
            }
            other => panic!("expected error output, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_rejected_while_active() {
        let (mut sup, _rx) = supervisor(SupervisorConfig::new(idle("up"), idle("b")));

        sup.start(ProcessName::Backend).unwrap();
        let err = sup.start(ProcessName::Backend).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: ProcessState::Starting,
                to: ProcessState::Starting,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ready_starts_browser() {
        let backend = sh("echo 'Listening on http://localhost:9000'; exec sleep 30");
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(backend, idle("browser up")));
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let events = wait_for(&mut rx, |e| is_started(e, ProcessName::Browser)).await;

        let line = events
            .iter()
            .position(|e| {
                matches!(e, SupervisorEvent::Output(o)
                    if o.kind == OutputKind::Output && o.text == "Listening on http://localhost:9000")
            })
            .expect("backend line forwarded");
        let ready = events.iter().position(is_ready).expect("ready emitted");
        assert!(line < ready);
        assert_eq!(
            events[ready],
            SupervisorEvent::Lifecycle(LifecycleEvent::Ready {
                source: ProcessName::Backend,
                url: "http://localhost:9000".into(),
            })
        );
        assert!(output_texts(&events, ProcessName::Backend)
            .contains(&"Detected server is ready at: http://localhost:9000".to_string()));

        commands.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ready_marker_uses_default_url() {
        let backend = sh("echo 'Server is ready'; exec sleep 30");
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(backend, idle("b")));
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let events = wait_for(&mut rx, is_ready).await;
        assert_eq!(
            events.last(),
            Some(&SupervisorEvent::Lifecycle(LifecycleEvent::Ready {
                source: ProcessName::Backend,
                url: "http://127.0.0.1:7788".into(),
            }))
        );

        commands.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_readiness_is_idempotent() {
        let backend = sh(
            "echo 'Server is ready'; echo 'Running on http://0.0.0.0:5000'; echo done; exec sleep 30",
        );
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(backend, idle("b")));
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let mut events = wait_for(&mut rx, |e| {
            matches!(e, SupervisorEvent::Output(o) if o.text == "done")
        })
        .await;
        commands.shutdown();
        task.await.unwrap().unwrap();
        events.extend(drain(&mut rx).await);

        assert_eq!(count(&events, is_ready), 1);
        assert_eq!(count(&events, |e| is_started(e, ProcessName::Browser)), 1);
        // The second ready line is still forwarded
        assert!(output_texts(&events, ProcessName::Backend)
            .contains(&"Running on http://0.0.0.0:5000".to_string()));
    }

    #[tokio::test]
    async fn test_backend_stderr_can_signal_ready() {
        let backend = sh("echo 'Uvicorn running on http://127.0.0.1:8000' >&2; exec sleep 30");
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(backend, idle("b")));
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let events = wait_for(&mut rx, is_ready).await;
        assert!(events.iter().any(|e| matches!(e, SupervisorEvent::Output(o)
            if o.kind == OutputKind::Error && o.text.starts_with("Uvicorn"))));

        commands.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_browser_output_never_triggers_ready() {
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(
            idle("backend up"),
            idle("Server is ready"),
        ));
        sup.start(ProcessName::Browser).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let mut events = wait_for(&mut rx, |e| {
            matches!(e, SupervisorEvent::Output(o) if o.text == "Server is ready")
        })
        .await;
        commands.shutdown();
        task.await.unwrap().unwrap();
        events.extend(drain(&mut rx).await);

        assert_eq!(count(&events, is_ready), 0);
        assert_eq!(count(&events, |e| is_started(e, ProcessName::Backend)), 0);
    }

    #[tokio::test]
    async fn test_unexpected_exit_then_restart() {
        let backend = sh("echo booting; sleep 0.2; exit 1");
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(backend, idle("b")));
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let events = wait_for(&mut rx, |e| is_state(e, ProcessName::Backend, ProcessState::Failed)).await;
        assert!(events.iter().any(|e| is_state(e, ProcessName::Backend, ProcessState::Running)));

        let events = wait_for(&mut rx, |e| {
            matches!(e, SupervisorEvent::Lifecycle(LifecycleEvent::Exited { .. }))
        })
        .await;
        assert_eq!(
            events.last(),
            Some(&SupervisorEvent::Lifecycle(LifecycleEvent::Exited {
                source: ProcessName::Backend,
                code: Some(1),
            }))
        );
        assert!(output_texts(&events, ProcessName::Backend)
            .contains(&"Backend process exited with code 1".to_string()));

        commands.restart_backend();
        let events = wait_for(&mut rx, |e| is_state(e, ProcessName::Backend, ProcessState::Running)).await;
        assert!(events.iter().any(|e| matches!(e,
            SupervisorEvent::Lifecycle(LifecycleEvent::StateChanged {
                source: ProcessName::Backend,
                from: ProcessState::Failed,
                to: ProcessState::Starting,
            }))));

        commands.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_double_restart_yields_one_new_process() {
        let (mut sup, mut rx) = supervisor(
            SupervisorConfig::new(idle("backend up"), idle("b")).with_grace(Duration::from_secs(1)),
        );
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        wait_for(&mut rx, |e| is_state(e, ProcessName::Backend, ProcessState::Running)).await;

        commands.restart_backend();
        commands.restart_backend();

        let mut events =
            wait_for(&mut rx, |e| is_state(e, ProcessName::Backend, ProcessState::Running)).await;

        // Give a duplicated restart time to surface before shutting down
        tokio::time::sleep(Duration::from_millis(300)).await;
        commands.shutdown();
        task.await.unwrap().unwrap();
        events.extend(drain(&mut rx).await);

        assert_eq!(count(&events, |e| is_started(e, ProcessName::Backend)), 1);
        assert_eq!(
            count(&events, |e| is_state(e, ProcessName::Backend, ProcessState::Stopping)),
            2, // the restart, then the shutdown
        );
        assert_eq!(
            count(&events, |e| {
                matches!(e, SupervisorEvent::Output(o) if o.text == "Restarting Backend process...")
            }),
            1
        );
    }

    #[tokio::test]
    async fn test_restart_resets_readiness_per_instance() {
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(
            ready_backend("http://127.0.0.1:9100"),
            idle("b"),
        ));
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        wait_for(&mut rx, |e| is_started(e, ProcessName::Browser)).await;
        commands.restart_backend();
        wait_for(&mut rx, is_ready).await;

        commands.shutdown();
        task.await.unwrap().unwrap();
        let rest = drain(&mut rx).await;
        // Browser was already started; a second ready does not start it again
        assert_eq!(count(&rest, |e| is_started(e, ProcessName::Browser)), 0);
    }

    #[tokio::test]
    async fn test_ready_line_while_stopping_is_ignored() {
        let (mut sup, mut rx) = supervisor(
            SupervisorConfig::new(idle("booting"), idle("b")).with_grace(Duration::from_millis(200)),
        );
        sup.start(ProcessName::Backend).unwrap();
        sup.restart(ProcessName::Backend).unwrap();
        assert_eq!(sup.state(ProcessName::Backend), ProcessState::Stopping);

        let instance = sup.process(ProcessName::Backend).instance();
        sup.process_message(Message::Process {
            name: ProcessName::Backend,
            instance,
            event: ProcessEvent::Line {
                stream: StreamKind::Stdout,
                text: "Server is ready".to_string(),
            },
        });

        assert_eq!(sup.ready_url(), None);
        assert_eq!(sup.state(ProcessName::Browser), ProcessState::NotStarted);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(count(&events, is_ready), 0);
        assert_eq!(count(&events, |e| is_started(e, ProcessName::Browser)), 0);
        // The line itself is still shown
        assert!(output_texts(&events, ProcessName::Backend).contains(&"Server is ready".to_string()));

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_error_reported_without_state_change() {
        let (mut sup, mut rx) = supervisor(SupervisorConfig::new(idle("booting"), idle("b")));
        sup.start(ProcessName::Backend).unwrap();
        let state = sup.state(ProcessName::Backend);
        let instance = sup.process(ProcessName::Backend).instance();

        sup.process_message(Message::Process {
            name: ProcessName::Backend,
            instance,
            event: ProcessEvent::StreamError {
                stream: StreamKind::Stdout,
                message: "broken pipe".to_string(),
            },
        });

        assert_eq!(sup.state(ProcessName::Backend), state);
        assert_eq!(sup.state(ProcessName::Browser), ProcessState::NotStarted);

        let mut errors = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SupervisorEvent::Output(o) = event {
                if o.kind == OutputKind::Error {
                    errors.push(o);
                }
            }
        }
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, ProcessName::Backend);
        assert_eq!(errors[0].text, "Failed to read Backend stdout: broken pipe");

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_escalates_after_grace() {
        let (mut sup, _rx) = supervisor(
            SupervisorConfig::new(stubborn(), idle("b")).with_grace(Duration::from_secs(2)),
        );
        sup.start(ProcessName::Backend).unwrap();

        // Drive the loop by hand until the trap is installed
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while sup.state(ProcessName::Backend) != ProcessState::Running {
                sup.step().await;
            }
        })
        .await
        .unwrap();

        let started = Instant::now();
        sup.shutdown().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(2), "stopped after {:?}", elapsed);
        assert!(sup.is_finished());
        assert_eq!(sup.state(ProcessName::Backend), ProcessState::Stopped);
        assert_eq!(sup.state(ProcessName::Browser), ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_restart_ignored_during_shutdown() {
        let (mut sup, mut rx) = supervisor(
            SupervisorConfig::new(idle("up"), idle("b")).with_grace(Duration::from_millis(500)),
        );
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();

        commands.shutdown();
        commands.restart_backend();
        sup.run().await.unwrap();

        let events = drain(&mut rx).await;
        assert_eq!(count(&events, |e| is_started(e, ProcessName::Backend)), 1);
        assert!(events.iter().any(|e| is_state(e, ProcessName::Backend, ProcessState::Stopped)));
    }

    #[tokio::test]
    async fn test_probe_confirms_listening_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let (mut sup, mut rx) = supervisor(
            SupervisorConfig::new(ready_backend(&url), idle("b"))
                .with_probe(Duration::from_secs(2)),
        );
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let events = wait_for(&mut rx, is_ready).await;
        assert!(!output_texts(&events, ProcessName::Backend)
            .iter()
            .any(|t| t.starts_with("Readiness probe failed")));

        commands.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_probe_falls_back_to_ready() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{}", port);

        let (mut sup, mut rx) = supervisor(
            SupervisorConfig::new(ready_backend(&url), idle("b"))
                .with_probe(Duration::from_millis(300)),
        );
        sup.start(ProcessName::Backend).unwrap();
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        let events = wait_for(&mut rx, is_ready).await;
        assert!(output_texts(&events, ProcessName::Backend)
            .iter()
            .any(|t| t.starts_with("Readiness probe failed")));

        commands.shutdown();
        task.await.unwrap().unwrap();
    }

    // ─────────────────────────────────────────────────────────
    // Transition property
    // ─────────────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    enum Op {
        Restart(ProcessName),
        Pause(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Restart(ProcessName::Backend)),
            Just(Op::Restart(ProcessName::Browser)),
            (0u64..80).prop_map(Op::Pause),
        ]
    }

    async fn run_ops(ops: Vec<Op>) -> Vec<SupervisorEvent> {
        let backend = sh("echo booting; sleep 0.05; echo 'Server is ready'; exec sleep 30");
        let (mut sup, mut rx) = supervisor(
            SupervisorConfig::new(backend, idle("b")).with_grace(Duration::from_millis(500)),
        );
        let _ = sup.start(ProcessName::Backend);
        let commands = sup.commands();
        let task = tokio::spawn(sup.run());

        for op in ops {
            match op {
                Op::Restart(name) => commands.restart(name),
                Op::Pause(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            }
        }
        commands.shutdown();
        task.await.unwrap().unwrap();
        drain(&mut rx).await
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_state_changes_follow_lifecycle_edges(
            ops in prop::collection::vec(op_strategy(), 1..8)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let events = rt.block_on(run_ops(ops));

            for name in ProcessName::ALL {
                let mut current = ProcessState::NotStarted;
                for event in &events {
                    if let SupervisorEvent::Lifecycle(LifecycleEvent::StateChanged { source, from, to }) = event {
                        if *source != name {
                            continue;
                        }
                        prop_assert_eq!(*from, current);
                        prop_assert!(from.can_transition_to(*to), "{} -> {}", from, to);
                        current = *to;
                    }
                }
                // Shutdown leaves nothing alive
                prop_assert!(!current.is_active(), "{} left {}", name, current);
            }
        }
    }
}

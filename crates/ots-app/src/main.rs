mod wiring;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use ots_config::DeviceConfig;
use ots_core::{
    hal::SimulatedIo,
    logging::{self, LogSettings},
    ota::UpdateFlag,
    runtime::Runtime,
};
use ots_protocol::{encode, Event, EventKind, Message};

/// A line from the peer, or the end of the channel.
enum Input {
    Line(String),
    Closed,
}

struct App {
    runtime: Runtime<SimulatedIo>,
    started: Instant,
    interval: Duration,
}

impl App {
    fn new(config: &DeviceConfig) -> Result<Self> {
        let mut runtime = Runtime::new(
            SimulatedIo::new(),
            wiring::device_info(config),
            config.runtime.queue_capacity,
        )
        .with_module_capacity(config.runtime.max_modules);

        let update = UpdateFlag::new();
        let modules = wiring::register_enabled(&mut runtime, config, &update)?;
        tracing::debug!(?modules, "modules registered");

        let app = Self {
            runtime,
            started: Instant::now(),
            interval: Duration::from_millis(config.runtime.loop_interval_ms),
        };
        Ok(app)
    }

    /// Milliseconds since start-up.
    fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn emit(&self, messages: &[Message]) -> Result<()> {
        let mut out = io::stdout().lock();
        for message in messages {
            let line = encode(message).context("failed to encode outbound message")?;
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }

    fn run(&mut self, input: Receiver<Input>) -> Result<()> {
        self.runtime.boot(self.now())?;
        self.emit(&[self.runtime.handshake()])?;

        let now = self.now();
        self.runtime.post(Event::new(EventKind::NetConnected, now));
        self.runtime.post(Event::new(EventKind::ChannelConnected, now));

        let mut closed = false;
        while !closed {
            match input.recv_timeout(self.interval) {
                Ok(first) => {
                    closed = self.accept(first);
                    while !closed {
                        match input.try_recv() {
                            Ok(next) => closed = self.accept(next),
                            Err(_) => break,
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => closed = true,
            }

            if closed {
                self.runtime
                    .post(Event::new(EventKind::ChannelDisconnected, self.now()));
            }
            let out = self.runtime.step(self.now());
            self.emit(&out)?;
        }

        tracing::info!(
            dropped = self.runtime.dropped_events(),
            tps = self.runtime.tps(),
            "peer channel closed"
        );
        self.runtime.shutdown();
        Ok(())
    }

    /// Feed one input to the runtime. Returns `true` once the peer is gone.
    fn accept(&mut self, input: Input) -> bool {
        match input {
            Input::Line(line) => {
                let now = self.now();
                self.runtime.handle_text(&line, now);
                false
            }
            Input::Closed => true,
        }
    }
}

fn spawn_stdin_reader() -> Receiver<Input> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Input::Closed);
    });
    rx
}

fn config_path() -> Option<PathBuf> {
    env::args_os()
        .nth(1)
        .or_else(|| env::var_os("OTS_CONFIG"))
        .map(PathBuf::from)
}

fn main() -> Result<()> {
    let path = config_path();
    let config = DeviceConfig::load(path.as_deref())?;

    logging::init(&LogSettings {
        level: config.logging.level.clone(),
        file: config.logging.file,
        dir: config.logging.dir.clone(),
    });
    tracing::info!(config = ?path, "ots-fw starting up");

    let mut app = App::new(&config)?;
    app.run(spawn_stdin_reader())?;

    tracing::info!("ots-fw shutting down");
    Ok(())
}

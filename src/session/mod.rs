//! Session Controller — owns one live experiment per connected client:
//! dispatches actions, runs a bounded-rate autoplay loop, and reports
//! frames plus daemon metrics. Binding this to an actual transport
//! (HTTP upgrade, websocket framing, CORS) is out of scope; this module
//! only defines the state machine and the wire-level message shapes.

pub mod metrics;
pub mod protocol;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand_chacha::ChaCha8Rng as StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::builder::{self, masks, BalanceMode, MaskKind};
use crate::catalog;
use crate::engine::StepEngine;
use crate::error::{EngineError, EngineResult};
use crate::inspector;
use crate::session::metrics::{compute_stats, StabilityHistory};
use crate::session::protocol::{Cell, ClientAction, PerfInfo, ServerMessage};
use crate::topology::Topology;

fn default_width() -> usize {
    50
}
fn default_height() -> usize {
    50
}
fn default_seed() -> u64 {
    0
}

/// Per-session configuration knobs (spec §6). `mask` selects a Kohonen-style
/// preset; `rule` selects a Wolfram rule; exactly one regime applies at a
/// time (`rule` takes precedence if both are set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub rule: Option<u8>,
    #[serde(default)]
    pub balance: Option<f32>,
    #[serde(default)]
    pub balance_mode: BalanceMode,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            mask: None,
            rule: None,
            balance: None,
            balance_mode: BalanceMode::None,
            seed: default_seed(),
        }
    }
}

/// One active experiment: the live topology (kept for the Inspector),
/// the compiled step engine, and the book-keeping needed for hot
/// reconnection and metrics.
struct Session {
    experiment_id: String,
    config: SessionConfig,
    topology: Topology,
    engine: StepEngine,
    mask_kind: MaskKind,
    generation: u64,
    history: StabilityHistory,
}

fn build_from_config(cfg: &SessionConfig) -> EngineResult<(Topology, MaskKind)> {
    let width = cfg.width;
    let height = cfg.height;

    if let Some(rule) = cfg.rule {
        let input_row = height - 1;
        let mut topo = builder::build_grid(width, height, &[input_row], &[0], 0.99);
        for row in 0..input_row {
            builder::apply_wolfram_rule(&mut topo, rule, row, width, height)?;
        }
        Ok((topo, MaskKind::Wolfram))
    } else {
        let mask_id = cfg.mask.as_deref().unwrap_or("simple");
        let preset = masks::get_preset(mask_id)?;
        let mut topo = builder::build_grid(width, height, &[], &[], 0.0);
        builder::apply_mask(&mut topo, width, height, &preset.mask, preset.random_weights, cfg.seed)?;
        match cfg.balance_mode {
            BalanceMode::Weight => {
                if let Some(target) = cfg.balance {
                    builder::balance_by_weight(&mut topo, target);
                }
            }
            BalanceMode::SynapseCount => {
                if let Some(target) = cfg.balance {
                    builder::balance_by_synapse_count(&mut topo, target, cfg.seed);
                }
            }
            BalanceMode::None => {}
        }
        Ok((topo, MaskKind::Kohonen))
    }
}

/// Randomises every neuron's initial value (Kohonen regime) or lights a
/// single seed cell at the bottom-centre (Wolfram regime), mirroring the
/// reference experiments' `setup` initial conditions.
fn initialize_values(engine: &mut StepEngine, width: usize, height: usize, mask_kind: MaskKind, seed: u64) -> EngineResult<()> {
    match mask_kind {
        MaskKind::Wolfram => {
            let center_x = width / 2;
            let bottom_y = height - 1;
            engine.set(bottom_y * width + center_x, 1.0)?;
        }
        MaskKind::Kohonen => {
            let mut rng = StdRng::seed_from_u64(seed);
            for idx in 0..(width * height) {
                engine.set(idx, rng.gen_range(0.0..1.0))?;
            }
        }
    }
    Ok(())
}

impl Session {
    fn new(experiment_id: String, config: SessionConfig) -> EngineResult<Self> {
        let (topology, mask_kind) = build_from_config(&config)?;
        let mut engine = StepEngine::compile(&topology);
        initialize_values(&mut engine, config.width, config.height, mask_kind, config.seed)?;
        Ok(Self {
            experiment_id,
            config,
            topology,
            engine,
            mask_kind,
            generation: 0,
            history: StabilityHistory::new(),
        })
    }

    fn reconnect(&mut self, new_config: SessionConfig) -> EngineResult<()> {
        let (new_topology, new_mask_kind) = build_from_config(&new_config)?;
        if new_mask_kind != self.mask_kind {
            *self = Session::new(self.experiment_id.clone(), new_config)?;
            return Ok(());
        }

        let saved_values: Vec<f32> = (0..self.engine.len())
            .map(|i| self.engine.value(i).unwrap_or(0.0))
            .collect();

        let mut new_engine = StepEngine::compile(&new_topology);
        for (i, v) in saved_values.into_iter().enumerate() {
            if i < new_engine.len() {
                new_engine.set(i, v)?;
            }
        }

        self.topology = new_topology;
        self.engine = new_engine;
        self.config = new_config;
        self.history.clear();
        Ok(())
    }

    fn frame_message(&mut self, perf: Option<PerfInfo>) -> ServerMessage {
        let grid = self.engine.snapshot(self.config.width, self.config.height);
        let rounded: Vec<Vec<i32>> = grid.outer_iter().map(|row| row.iter().map(|v| v.round() as i32).collect()).collect();

        let values: Vec<f32> = (0..self.config.width * self.config.height)
            .map(|i| self.engine.value(i).unwrap_or(0.0))
            .collect();
        let stats = compute_stats(&values, self.config.width, self.config.height, self.generation, &mut self.history);

        ServerMessage::Frame {
            generation: self.generation,
            grid: rounded,
            stats,
            perf,
        }
    }

    fn click(&mut self, x: usize, y: usize) -> EngineResult<()> {
        if x >= self.config.width || y >= self.config.height {
            return Ok(());
        }
        let idx = y * self.config.width + x;
        match self.mask_kind {
            MaskKind::Wolfram => {
                if self.topology.get_neuron_by_coord(x, y)?.is_input_locked() {
                    self.engine.set(idx, 1.0)?;
                }
            }
            MaskKind::Kohonen => {
                let current = self.engine.value(idx)?;
                self.engine.set(idx, if current >= 0.5 { 0.0 } else { 1.0 })?;
            }
        }
        Ok(())
    }

    fn paint(&mut self, cells: &[Cell], value: f32) -> EngineResult<()> {
        for cell in cells {
            if cell.x < self.config.width && cell.y < self.config.height {
                let idx = cell.y * self.config.width + cell.x;
                self.engine.set(idx, value)?;
            }
        }
        Ok(())
    }

    fn step_ticks(&mut self, count: usize) {
        self.engine.step_n(count);
        self.generation += count as u64;
    }

    fn inspect(&self, x: usize, y: usize) -> EngineResult<ServerMessage> {
        let report = inspector::inspect(&self.topology, x, y, self.config.width, self.config.height)?;
        Ok(ServerMessage::Connections(report))
    }
}

/// Top-level controller dispatched into by a transport layer. Owns at most
/// one [`Session`]; actions before `start` fail with
/// [`EngineError::State`].
pub struct SessionController {
    session: Option<Session>,
    playing: bool,
    fps: u32,
    steps_per_tick: usize,
    play_task: Option<JoinHandle<()>>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            session: None,
            playing: false,
            fps: 10,
            steps_per_tick: 1,
            play_task: None,
        }
    }

    fn active(&mut self) -> EngineResult<&mut Session> {
        self.session.as_mut().ok_or_else(|| EngineError::State("no experiment started".into()))
    }

    /// Dispatches one action, applying it to completion, and returns the
    /// messages to send back (in order). `Play` additionally requires the
    /// caller to spawn [`SessionController::spawn_autoplay`] (and register
    /// its handle via [`SessionController::set_play_task`]) to actually
    /// start ticking.
    #[tracing::instrument(skip(self, action))]
    pub fn handle(&mut self, action: ClientAction) -> EngineResult<Vec<ServerMessage>> {
        match action {
            ClientAction::Start { experiment, config } => {
                catalog::get_experiment(&experiment)?;
                let cfg: SessionConfig = serde_json::from_value(config).map_err(|e| EngineError::Transport(e.to_string()))?;
                let mut session = Session::new(experiment, cfg)?;
                let frame = session.frame_message(None);
                self.session = Some(session);
                Ok(vec![ServerMessage::Status { state: "ready" }, frame])
            }
            ClientAction::Click { x, y } => {
                self.active()?.click(x, y)?;
                Ok(vec![self.active()?.frame_message(None)])
            }
            ClientAction::Paint { cells, value } => {
                self.active()?.paint(&cells, value)?;
                Ok(vec![self.active()?.frame_message(None)])
            }
            ClientAction::Step { count } => {
                let count = count.max(1);
                let t0 = Instant::now();
                self.active()?.step_ticks(count);
                let perf = PerfInfo::new(count, t0.elapsed());
                Ok(vec![self.active()?.frame_message(perf)])
            }
            ClientAction::Play { fps, steps_per_tick } => {
                self.active()?; // error out if no session yet
                self.fps = fps.max(1);
                self.steps_per_tick = steps_per_tick.max(1);
                self.playing = true;
                if let Some(handle) = self.play_task.take() {
                    handle.abort();
                }
                Ok(vec![ServerMessage::Status { state: "running" }])
            }
            ClientAction::Pause => {
                self.playing = false;
                if let Some(handle) = self.play_task.take() {
                    handle.abort();
                }
                Ok(vec![ServerMessage::Status { state: "paused" }])
            }
            ClientAction::Reset => {
                let session = self.active()?;
                let fresh = Session::new(session.experiment_id.clone(), session.config.clone())?;
                self.playing = false;
                if let Some(handle) = self.play_task.take() {
                    handle.abort();
                }
                self.session = Some(fresh);
                let frame = self.active()?.frame_message(None);
                Ok(vec![ServerMessage::Status { state: "ready" }, frame])
            }
            ClientAction::Reconnect { config } => {
                let session = self.active()?;
                let cfg: SessionConfig = serde_json::from_value(config).map_err(|e| EngineError::Transport(e.to_string()))?;
                session.reconnect(cfg)?;
                let frame = session.frame_message(None);
                Ok(vec![ServerMessage::Status { state: "ready" }, frame])
            }
            ClientAction::Inspect { x, y } => Ok(vec![self.active()?.inspect(x, y)?]),
        }
    }

    /// True while an autoplay loop should keep ticking.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Registers the handle returned by [`SessionController::spawn_autoplay`]
    /// so a later `pause`/`reset`/disconnect can abort it. Replacing an
    /// already-registered handle aborts the old one first, mirroring
    /// `play`'s pre-cancel-prior-autoplay rule (spec §4.5).
    pub fn set_play_task(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.play_task.replace(handle) {
            old.abort();
        }
    }

    /// Cleans up on client disconnect: stops autoplay, drops the session.
    pub fn cleanup(&mut self) {
        self.playing = false;
        if let Some(handle) = self.play_task.take() {
            handle.abort();
        }
        self.session = None;
    }

    /// Spawns the autoplay loop as a cancellable background task and returns
    /// its handle; the caller should pass it to
    /// [`SessionController::set_play_task`] so `pause`/`reset`/disconnect can
    /// abort it, mirroring the reference implementation's `self._play_task`
    /// bookkeeping. Frames are pushed to `out` as they're produced; the loop
    /// exits when `playing` goes false or the channel receiver is dropped.
    pub fn spawn_autoplay(controller: &Arc<Mutex<SessionController>>, out: mpsc::UnboundedSender<ServerMessage>) -> JoinHandle<()> {
        let controller = controller.clone();
        tokio::spawn(async move {
            SessionController::autoplay_loop(controller, out).await;
        })
    }

    async fn autoplay_loop(controller: Arc<Mutex<SessionController>>, out: mpsc::UnboundedSender<ServerMessage>) {
        loop {
            let (fps, steps_per_tick, playing) = {
                let guard = controller.lock().await;
                (guard.fps, guard.steps_per_tick, guard.playing)
            };
            if !playing {
                break;
            }

            let t0 = Instant::now();
            let outcome = {
                let mut guard = controller.lock().await;
                match guard.active() {
                    Ok(session) => {
                        session.step_ticks(steps_per_tick);
                        Ok(session.frame_message(PerfInfo::new(steps_per_tick, t0.elapsed())))
                    }
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(frame) => {
                    if out.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = out.send(ServerMessage::Error { message: e.to_string() });
                    break;
                }
            }

            let period = Duration::from_secs_f64(1.0 / fps as f64);
            let elapsed = t0.elapsed();
            if elapsed < period {
                tokio::time::sleep(period - elapsed).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start_kohonen(controller: &mut SessionController) {
        let action = ClientAction::Start {
            experiment: "kohonen".to_string(),
            config: json!({"width": 6, "height": 6, "mask": "all_exc", "seed": 3}),
        };
        let msgs = controller.handle(action).unwrap();
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn actions_before_start_fail_with_state_error() {
        let mut controller = SessionController::new();
        let err = controller.handle(ClientAction::Click { x: 0, y: 0 }).unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[test]
    fn start_unknown_experiment_errors() {
        let mut controller = SessionController::new();
        let action = ClientAction::Start { experiment: "bogus".to_string(), config: json!({}) };
        assert!(controller.handle(action).is_err());
    }

    #[test]
    fn start_then_click_then_step_produces_frames() {
        let mut controller = SessionController::new();
        start_kohonen(&mut controller);
        let msgs = controller.handle(ClientAction::Click { x: 1, y: 1 }).unwrap();
        assert_eq!(msgs.len(), 1);
        let msgs = controller.handle(ClientAction::Step { count: 3 }).unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn reset_restores_ready_state_and_reinitialises() {
        let mut controller = SessionController::new();
        start_kohonen(&mut controller);
        controller.handle(ClientAction::Step { count: 5 }).unwrap();
        let msgs = controller.handle(ClientAction::Reset).unwrap();
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn wolfram_click_only_activates_input_locked_cells() {
        let mut controller = SessionController::new();
        let action = ClientAction::Start {
            experiment: "von_neumann".to_string(),
            config: json!({"width": 5, "height": 4, "rule": 110}),
        };
        controller.handle(action).unwrap();
        // (2, 3) is the bottom row -> input-locked; (2, 0) is a regular cell.
        controller.handle(ClientAction::Click { x: 2, y: 3 }).unwrap();
        let session = controller.session.as_ref().unwrap();
        assert_eq!(session.engine.value(3 * 5 + 2).unwrap(), 1.0);
    }

    #[test]
    fn reconnect_same_regime_preserves_values() {
        let mut controller = SessionController::new();
        start_kohonen(&mut controller);
        controller.handle(ClientAction::Click { x: 0, y: 0 }).unwrap();
        let before = controller.session.as_ref().unwrap().engine.value(0).unwrap();
        let action = ClientAction::Reconnect { config: json!({"width": 6, "height": 6, "mask": "all_inh", "seed": 3}) };
        controller.handle(action).unwrap();
        let after = controller.session.as_ref().unwrap().engine.value(0).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn pause_without_play_is_idempotent() {
        let mut controller = SessionController::new();
        start_kohonen(&mut controller);
        let msgs = controller.handle(ClientAction::Pause).unwrap();
        assert_eq!(msgs.len(), 1);
    }
}

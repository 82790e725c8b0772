//! The top-level game object: owns the level catalog, the loaded level and
//! the queue every agent action flows through.

use std::{future::Future, sync::Arc};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    Direction, GridPosition, Turn,
    agent::{Agent, AgentState},
    board::Board,
    catalog::LevelCatalog,
    controller::{self, Controller, FrontView, Generation, Heading},
    error::{GameError, LevelError},
    level::LevelConfig,
    queue::{ActionQueue, QueueStatus},
    rules::{self, Medal, Outcome},
    settings::{Settings, pause},
};

/// What a finished level reports to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelReport {
    pub level_id: String,
    pub won: bool,
    pub step_count: u32,
    pub reason: Option<String>,
    pub medal: Option<Medal>,
}

/// Hooks for the result screen and analytics.
///
/// Calls are fire-and-forget from inside the action queue, so implementations
/// must return quickly and must not call back into the session.
pub trait GameObserver: Send + Sync {
    fn level_started(&self, _level: &LevelConfig) {}
    fn run_started(&self, _level_id: &str) {}
    fn level_finished(&self, _report: &LevelReport) {}
    /// Fired the first time a level is won. `completed` counts distinct levels won so far.
    fn level_completed(&self, _level_id: &str, _completed: usize) {}
}

/// Logs every hook through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl GameObserver for TracingObserver {
    fn level_started(&self, level: &LevelConfig) {
        info!(level = %level.id, title = %level.title, "level started");
    }

    fn run_started(&self, level_id: &str) {
        info!(level = level_id, "run started");
    }

    fn level_finished(&self, report: &LevelReport) {
        info!(
            level = %report.level_id,
            won = report.won,
            steps = report.step_count,
            reason = ?report.reason,
            medal = ?report.medal,
            "level finished"
        );
    }

    fn level_completed(&self, level_id: &str, completed: usize) {
        info!(level = level_id, completed, "level completed");
    }
}

/// Snapshot of the loaded level, published after every action.
#[derive(Debug, Clone)]
pub struct Scene {
    pub level_id: String,
    pub board: Board,
    pub steps: u32,
    pub max_steps: Option<u32>,
    pub outcome: Option<Outcome>,
}

struct Shared {
    settings: Settings,
    observer: Arc<dyn GameObserver>,
    agent: Arc<watch::Sender<Option<AgentState>>>,
    scene: watch::Sender<Option<Scene>>,
    completed: watch::Sender<Vec<String>>,
    /// Bumped on every load or reset; older level instances go quiet.
    generation: Generation,
}

/// One level instance. Only the queue's drain task touches it.
///
/// A reset retires the instance through its generation. An operation already
/// running on another worker may finish its current action, but it can no
/// longer act, publish or report.
struct LevelState {
    config: Arc<LevelConfig>,
    board: Board,
    controller: Controller,
    steps: u32,
    outcome: Option<Outcome>,
    generation: Generation,
    shared: Arc<Shared>,
}

impl LevelState {
    fn new(
        config: Arc<LevelConfig>,
        board: Board,
        shared: Arc<Shared>,
        generation: Generation,
    ) -> Self {
        let controller = Controller::with_publisher(
            shared.settings.timing.clone(),
            shared.agent.clone(),
            generation.clone(),
        );
        Self {
            config,
            board,
            controller,
            steps: 0,
            outcome: None,
            generation,
            shared,
        }
    }

    /// Mutating actions stop once the level has an outcome, the step budget is
    /// spent, or the instance was replaced.
    fn can_act(&self) -> bool {
        if !self.generation.is_current() {
            debug!(level = %self.config.id, "level instance retired");
            return false;
        }
        if self.outcome.is_some() {
            return false;
        }
        match self.config.max_steps {
            Some(max) if self.steps >= max => {
                debug!(level = %self.config.id, max, "step budget spent");
                false
            }
            _ => true,
        }
    }

    fn publish(&self) {
        let agent = self.board.agent().map(Agent::state);
        self.generation.publish(&self.shared.agent, agent);
        let scene = Scene {
            level_id: self.config.id.clone(),
            board: self.board.clone(),
            steps: self.steps,
            max_steps: self.config.max_steps,
            outcome: self.outcome.clone(),
        };
        self.generation.publish(&self.shared.scene, Some(scene));
    }

    fn record(&mut self, done: bool) -> bool {
        if done {
            self.steps += 1;
        }
        self.publish();
        done
    }

    async fn walk(&mut self, heading: Heading, steps: u32) -> Result<bool, GameError> {
        for _ in 0..steps {
            if !self.can_act() {
                return Ok(false);
            }
            let moved = self.controller.step(&mut self.board, heading).await?;
            if !self.record(moved) {
                debug!(?heading, "move stopped early");
                return Ok(false);
            }
            pause(self.shared.settings.timing.step_gap_ms).await;
        }
        Ok(true)
    }

    async fn turn(&mut self, turn: Turn) -> Result<bool, GameError> {
        if !self.can_act() {
            return Ok(false);
        }
        let done = self.controller.rotate(&mut self.board, turn).await?;
        Ok(self.record(done))
    }

    async fn face(&mut self, direction: Direction) -> Result<bool, GameError> {
        if !self.can_act() {
            return Ok(false);
        }
        let done = self.controller.face(&mut self.board, direction).await?;
        Ok(self.record(done))
    }

    async fn pick(&mut self) -> Result<bool, GameError> {
        if !self.can_act() {
            return Ok(false);
        }
        let done = self.controller.pick_up(&mut self.board).await?;
        Ok(self.record(done))
    }

    async fn drop_item(&mut self) -> Result<bool, GameError> {
        if !self.can_act() {
            return Ok(false);
        }
        let done = self.controller.drop_item(&mut self.board).await?;
        if self.record(done) {
            pause(self.shared.settings.timing.settle_ms).await;
            self.evaluate();
        }
        Ok(done)
    }

    async fn teleport(&mut self, to: GridPosition) -> Result<bool, GameError> {
        if !self.can_act() {
            return Ok(false);
        }
        let done = self.controller.set_position(&mut self.board, to).await?;
        self.publish();
        Ok(done)
    }

    fn evaluate(&mut self) {
        if !self.generation.is_current() {
            return;
        }
        let Some(outcome) = rules::evaluate(&self.config.win_conditions, &self.board) else {
            return;
        };
        let id = self.config.id.clone();
        let report = LevelReport {
            level_id: id.clone(),
            won: outcome.is_won(),
            step_count: self.steps,
            reason: match &outcome {
                Outcome::Failed(reason) => Some(reason.to_string()),
                Outcome::Won => None,
            },
            medal: outcome
                .is_won()
                .then(|| self.config.medals.grade(self.steps))
                .flatten(),
        };
        self.outcome = Some(outcome);
        self.publish();

        let live = &self.generation;
        let first_win = report.won
            && self.shared.completed.send_if_modified(|done| {
                if !live.is_current() || done.contains(&id) {
                    false
                } else {
                    done.push(id.clone());
                    true
                }
            });
        if !live.is_current() {
            return;
        }
        self.shared.observer.level_finished(&report);
        if first_win {
            let completed = self.shared.completed.borrow().len();
            self.shared.observer.level_completed(&id, completed);
        }
    }
}

/// Owns the catalog, the loaded level and its action queue.
///
/// Actions return futures that are queued the moment the method is called, so
/// a caller may issue a whole program up front and await the results later.
/// Must be created inside a tokio runtime.
pub struct GameSession {
    catalog: LevelCatalog,
    current: Option<Arc<LevelConfig>>,
    queue: ActionQueue<LevelState>,
    shared: Arc<Shared>,
}

impl GameSession {
    pub fn new(settings: Settings, catalog: LevelCatalog, observer: Arc<dyn GameObserver>) -> Self {
        let (agent, _) = watch::channel(None);
        let (scene, _) = watch::channel(None);
        let (completed, _) = watch::channel(Vec::new());
        Self {
            catalog,
            current: None,
            queue: ActionQueue::new(),
            shared: Arc::new(Shared {
                settings,
                observer,
                agent: Arc::new(agent),
                scene,
                completed,
                generation: Generation::default(),
            }),
        }
    }

    pub fn catalog(&self) -> &LevelCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn current_level(&self) -> Option<&LevelConfig> {
        self.current.as_deref()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Loads a level from the catalog.
    pub fn load_level(&mut self, id: &str) -> Result<(), GameError> {
        let config = self
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| LevelError::UnknownLevel(id.to_string()))?;
        self.load_config(config)
    }

    /// Loads a level that is not part of the catalog.
    pub fn load_config(&mut self, config: LevelConfig) -> Result<(), GameError> {
        let config = Arc::new(config);
        self.install(config.clone())?;
        info!(level = %config.id, "level loaded");
        self.shared.observer.level_started(&config);
        Ok(())
    }

    /// Discards queued actions and rebuilds the board from the same config.
    pub fn reset_level(&mut self) -> Result<(), GameError> {
        let config = self.current.clone().ok_or(GameError::NoLevel)?;
        self.install(config)?;
        debug!("level reset");
        Ok(())
    }

    /// Resets the level ahead of running a new program.
    pub fn begin_run(&mut self) -> Result<(), GameError> {
        self.reset_level()?;
        if let Some(level) = &self.current {
            self.shared.observer.run_started(&level.id);
        }
        Ok(())
    }

    /// Loads the level after the current one. `None` at the end of the catalog.
    pub fn next_level(&mut self) -> Result<Option<String>, GameError> {
        let current = self.current.as_ref().ok_or(GameError::NoLevel)?;
        let Some(next) = self.catalog.next_after(&current.id).map(|l| l.id.clone()) else {
            return Ok(None);
        };
        self.load_level(&next)?;
        Ok(Some(next))
    }

    /// Ids of levels won this session, in the order they were first won.
    pub fn completed_levels(&self) -> Vec<String> {
        self.shared.completed.borrow().clone()
    }

    fn install(&mut self, config: Arc<LevelConfig>) -> Result<(), GameError> {
        let board = config.build(&self.shared.settings)?;
        // retire the running instance before anything of the new one is visible
        let generation = self.shared.generation.next();
        let state = LevelState::new(config.clone(), board, self.shared.clone(), generation);
        state.publish();
        if let Err(state) = self.queue.attach(state) {
            // dropping the old queue discards whatever it still held
            self.queue = ActionQueue::with_state(state);
        }
        self.current = Some(config);
        Ok(())
    }

    /// Resolves once a level is loaded. Actions issued earlier wait for it.
    pub fn ready(&self) -> impl Future<Output = Result<(), GameError>> + Send + use<> {
        let ready = self.queue.ready();
        async move { Ok(ready.await?) }
    }

    /// Agent snapshot, read without queueing.
    pub fn get_state(&self) -> Option<AgentState> {
        self.shared.agent.borrow().clone()
    }

    pub fn subscribe_agent(&self) -> watch::Receiver<Option<AgentState>> {
        self.shared.agent.subscribe()
    }

    pub fn subscribe_scene(&self) -> watch::Receiver<Option<Scene>> {
        self.shared.scene.subscribe()
    }

    /// Steps forward up to `steps` tiles, stopping at the first blocked one.
    pub fn move_forward(
        &self,
        steps: u32,
    ) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue(format!("move_forward({steps})"), move |level: &mut LevelState| {
            Box::pin(level.walk(Heading::Forward, steps))
        })
    }

    /// Steps backward without turning around.
    pub fn move_backward(
        &self,
        steps: u32,
    ) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue(format!("move_backward({steps})"), move |level: &mut LevelState| {
            Box::pin(level.walk(Heading::Backward, steps))
        })
    }

    pub fn rotate_left(&self) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue("rotate_left", |level: &mut LevelState| {
            Box::pin(level.turn(Turn::CounterClockwise))
        })
    }

    pub fn rotate_right(&self) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue("rotate_right", |level: &mut LevelState| {
            Box::pin(level.turn(Turn::Clockwise))
        })
    }

    pub fn face(
        &self,
        direction: Direction,
    ) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue(format!("face({direction})"), move |level: &mut LevelState| {
            Box::pin(level.face(direction))
        })
    }

    pub fn pickup_item(&self) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue("pickup_item", |level: &mut LevelState| Box::pin(level.pick()))
    }

    /// Drops the carried item, then judges the level once it settles.
    pub fn drop_item(&self) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue("drop_item", |level: &mut LevelState| Box::pin(level.drop_item()))
    }

    pub fn set_position(
        &self,
        row: usize,
        col: usize,
    ) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        self.queue.enqueue(format!("set_position({row}, {col})"), move |level: &mut LevelState| {
            Box::pin(level.teleport(GridPosition::new(row, col)))
        })
    }

    /// Describes the cell ahead once every earlier action has finished.
    pub fn survey_front(
        &self,
    ) -> impl Future<Output = Result<FrontView, GameError>> + Send + use<> {
        self.queue.enqueue("survey_front", |level: &mut LevelState| {
            Box::pin(async move { controller::survey_front(&level.board) })
        })
    }

    /// Whether the object ahead carries `name = true`.
    pub fn check_attribute(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<bool, GameError>> + Send + use<> {
        let name = name.to_string();
        self.queue.enqueue(format!("check_attribute({name})"), move |level: &mut LevelState| {
            Box::pin(async move { Ok(controller::survey_front(&level.board)?.has_flag(&name)) })
        })
    }
}

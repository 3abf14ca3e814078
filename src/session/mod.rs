//! Peer session - One player's side of a match
//!
//! After pairing, each client runs a [`PeerSession`]: it owns the local copy
//! of the board, the turn counter and the turn timer, and exchanges
//! [`PeerMessage`]s with the opponent's session. There is no referee; both
//! sides apply the same rules to the same moves and are trusted to agree.
//!
//! Two tasks drive a session: the receive loop ([`PeerSession::run_receiver`])
//! and the caller's input loop ([`PeerSession::handle_input`]). Timer
//! callbacks run on their own tasks. All of them go through one lock around
//! the match.

mod command;
mod state;
pub mod timer;

pub use command::*;
pub use state::*;
pub use timer::TurnTimer;

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::GameConfig;
use crate::game::{evaluate, Board, Move, DEFAULT_BOARD_SIZE};
use crate::network::{Connection, LinkError};
use crate::protocol::{DisplayName, PeerMessage, TurnOrder};

/// Rules and timing for one match
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub board_size: usize,
    /// Time a player gets per move
    pub turn_timeout: Duration,
    /// Extra wait before declaring the opponent out of time
    pub timeout_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            turn_timeout: Duration::from_secs(10),
            timeout_grace: Duration::from_secs(1),
        }
    }
}

impl From<&GameConfig> for SessionConfig {
    fn from(config: &GameConfig) -> Self {
        Self {
            board_size: config.board_size,
            turn_timeout: config.turn_timeout(),
            timeout_grace: config.timeout_grace(),
        }
    }
}

/// Which player did something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Opponent,
}

/// Events emitted by a session for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A stone was placed; `board` is the position afterwards
    MoveApplied { side: Side, mv: Move, board: Board },
    /// A new turn started and its timer is running
    TurnStarted {
        side: Side,
        turn_index: u32,
        timeout: Duration,
    },
    /// Chat text from the opponent
    Chat { text: String },
    /// The match reached a terminal status
    Finished { status: Status, reason: FinishReason },
}

/// Whether a loop driving the session should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Everything guarded by the match lock
struct Match {
    board: Board,
    state: MatchState,
    timer: Option<TurnTimer>,
    /// Bumped on every arm, so a timer that lost a race can tell
    timer_generation: u64,
}

impl Match {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

struct Shared {
    game: Mutex<Match>,
    connection: Connection,
    turn_order: TurnOrder,
    opponent: DisplayName,
    config: SessionConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: watch::Sender<bool>,
}

/// One player's view of a running match
#[derive(Clone)]
pub struct PeerSession {
    shared: Arc<Shared>,
}

impl PeerSession {
    /// Create a session; nothing runs until [`start`](Self::start) and
    /// [`spawn_receiver`](Self::spawn_receiver) are called.
    pub fn new(
        connection: Connection,
        turn_order: TurnOrder,
        opponent: DisplayName,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let game = Match {
            board: Board::new(config.board_size),
            state: MatchState::new(),
            timer: None,
            timer_generation: 0,
        };

        let shared = Arc::new(Shared {
            game: Mutex::new(game),
            connection,
            turn_order,
            opponent,
            config,
            events,
            closed,
        });

        (Self { shared }, event_rx)
    }

    pub fn turn_order(&self) -> TurnOrder {
        self.shared.turn_order
    }

    pub fn opponent(&self) -> &DisplayName {
        &self.shared.opponent
    }

    pub fn connection(&self) -> &Connection {
        &self.shared.connection
    }

    /// Start the clock for the opening turn
    pub async fn start(&self) {
        let mut game = self.shared.game.lock().await;
        if game.state.is_playing() && game.timer.is_none() {
            self.shared.arm_timer(&mut game);
        }
    }

    pub async fn status(&self) -> Status {
        self.shared.game.lock().await.state.status()
    }

    pub async fn state(&self) -> MatchState {
        self.shared.game.lock().await.state.clone()
    }

    pub async fn board(&self) -> Board {
        self.shared.game.lock().await.board.clone()
    }

    /// Whether the local player may move right now
    pub async fn is_my_turn(&self) -> bool {
        let game = self.shared.game.lock().await;
        game.state.is_playing() && self.shared.turn_order.moves_on(game.state.turn_index())
    }

    /// Whether the session loop has ended (exit, resignation, lost peer)
    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Wait until the session loop ends
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Run the receive loop on its own task
    pub fn spawn_receiver(&self) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run_receiver().await })
    }

    /// Receive and dispatch opponent messages until the session ends
    pub async fn run_receiver(&self) {
        let mut closed_rx = self.shared.closed.subscribe();

        loop {
            if *closed_rx.borrow_and_update() {
                break;
            }

            let result = tokio::select! {
                result = self.shared.connection.recv() => result,
                _ = closed_rx.changed() => continue,
            };

            match result {
                Ok(message) => {
                    if self.handle_message(message).await == Flow::Stop {
                        break;
                    }
                }
                Err(LinkError::Protocol(e)) => {
                    tracing::warn!("Dropping datagram from {}: {}", self.shared.opponent, e);
                }
                Err(e) => {
                    tracing::warn!("Lost connection to {}: {}", self.shared.opponent, e);
                    self.shared.opponent_gone(FinishReason::OpponentUnreachable).await;
                    break;
                }
            }
        }

        tracing::debug!("Receive loop finished");
    }

    /// Apply one message from the opponent
    pub async fn handle_message(&self, message: PeerMessage) -> Flow {
        match message {
            PeerMessage::Move(mv) => {
                self.shared.remote_move(mv).await;
                Flow::Continue
            }
            PeerMessage::Exit => {
                tracing::info!("{} exited", self.shared.opponent);
                self.shared.opponent_gone(FinishReason::OpponentExited).await;
                Flow::Stop
            }
            PeerMessage::Resign => {
                tracing::info!("{} resigned", self.shared.opponent);
                self.shared.opponent_gone(FinishReason::OpponentResigned).await;
                Flow::Stop
            }
            PeerMessage::Chat { text } => {
                self.shared.emit(SessionEvent::Chat { text });
                Flow::Continue
            }
        }
    }

    /// Parse and run one line of local input
    pub async fn handle_input(&self, line: &str) -> Result<Flow, CommandError> {
        match LocalCommand::parse(line)? {
            Some(command) => self.execute(command).await,
            None => Ok(Flow::Continue),
        }
    }

    /// Run a local command
    pub async fn execute(&self, command: LocalCommand) -> Result<Flow, CommandError> {
        match command {
            LocalCommand::Exit => {
                self.shared.exit().await;
                Ok(Flow::Stop)
            }
            LocalCommand::Resign => {
                self.shared.resign().await?;
                Ok(Flow::Continue)
            }
            LocalCommand::Move(mv) => {
                self.shared.local_move(mv).await?;
                Ok(Flow::Continue)
            }
            LocalCommand::Chat(text) => {
                self.shared.send(PeerMessage::Chat { text }).await?;
                Ok(Flow::Continue)
            }
        }
    }
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // The consumer may have gone away; the match goes on without it
        let _ = self.events.send(event);
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Terminal transition plus its side effects. No-op once finished.
    fn finish(&self, game: &mut Match, status: Status, reason: FinishReason) -> bool {
        game.cancel_timer();
        if !game.state.finish(status) {
            return false;
        }

        tracing::info!("Match against {} finished: {} ({})", self.opponent, status, reason);
        self.emit(SessionEvent::Finished { status, reason });
        true
    }

    /// Start the countdown for whoever moves on the current turn
    fn arm_timer(self: &Arc<Self>, game: &mut Match) {
        game.cancel_timer();
        game.timer_generation += 1;

        let generation = game.timer_generation;
        let turn_index = game.state.turn_index();
        let side = if self.turn_order.moves_on(turn_index) {
            Side::Local
        } else {
            Side::Opponent
        };
        let timeout = match side {
            Side::Local => self.config.turn_timeout,
            Side::Opponent => self.config.turn_timeout.saturating_add(self.config.timeout_grace),
        };

        let session: Weak<Shared> = Arc::downgrade(self);
        game.timer = Some(TurnTimer::start(timeout, move || async move {
            if let Some(session) = session.upgrade() {
                session.turn_expired(generation).await;
            }
        }));

        self.emit(SessionEvent::TurnStarted {
            side,
            turn_index,
            timeout,
        });
    }

    async fn turn_expired(self: &Arc<Self>, generation: u64) {
        let local_turn = {
            let mut game = self.game.lock().await;
            if game.timer_generation != generation || !game.state.is_playing() {
                return;
            }
            // Already fired; nothing left to cancel
            game.timer = None;

            let local_turn = self.turn_order.moves_on(game.state.turn_index());
            if local_turn {
                tracing::info!("Time over on turn {}", game.state.turn_index());
                self.finish(&mut game, Status::Lose, FinishReason::TimedOut);
            } else {
                tracing::info!("{} ran out of time", self.opponent);
                self.finish(&mut game, Status::Win, FinishReason::OpponentTimedOut);
            }
            local_turn
        };

        // Let the opponent converge on the same result
        if local_turn {
            if let Err(e) = self.connection.send(&PeerMessage::Resign).await {
                tracing::warn!("Could not notify {} of timeout: {}", self.opponent, e);
            }
        }
    }

    /// Draw/win check after a stone was placed, then advance the turn.
    /// A full board is a draw even when the last stone completes a row.
    fn settle(self: &Arc<Self>, game: &mut Match, mv: Move, side: Side) {
        game.state.advance_turn();

        if game.board.is_full() {
            self.finish(game, Status::Draw, FinishReason::BoardFull);
        } else if evaluate(&game.board, mv).is_some() {
            let status = match side {
                Side::Local => Status::Win,
                Side::Opponent => Status::Lose,
            };
            self.finish(game, status, FinishReason::FiveInARow);
        } else {
            self.arm_timer(game);
        }
    }

    async fn local_move(self: &Arc<Self>, mv: Move) -> Result<(), CommandError> {
        {
            let mut game = self.game.lock().await;

            if !game.state.is_playing() {
                return Err(CommandError::AlreadyFinished);
            }
            if !self.turn_order.moves_on(game.state.turn_index()) {
                return Err(CommandError::NotYourTurn);
            }
            game.board.validate(mv)?;

            game.cancel_timer();
            game.board.place(mv, self.turn_order.stone())?;
            game.state.record_move();

            self.emit(SessionEvent::MoveApplied {
                side: Side::Local,
                mv,
                board: game.board.clone(),
            });
            self.settle(&mut game, mv, Side::Local);
        }

        self.send(PeerMessage::Move(mv)).await
    }

    async fn remote_move(self: &Arc<Self>, mv: Move) {
        let mut game = self.game.lock().await;

        if !game.state.is_playing() {
            tracing::debug!("Ignoring move {} after the match ended", mv);
            return;
        }
        if self.turn_order.moves_on(game.state.turn_index()) {
            tracing::warn!("Ignoring move {} from {}: not their turn", mv, self.opponent);
            return;
        }
        if let Err(e) = game.board.place(mv, self.turn_order.stone().opposite()) {
            tracing::warn!("Ignoring move from {}: {}", self.opponent, e);
            return;
        }
        game.state.record_move();

        self.emit(SessionEvent::MoveApplied {
            side: Side::Opponent,
            mv,
            board: game.board.clone(),
        });
        self.settle(&mut game, mv, Side::Opponent);
    }

    async fn resign(&self) -> Result<(), CommandError> {
        {
            let mut game = self.game.lock().await;
            if !game.state.is_playing() {
                return Err(CommandError::AlreadyFinished);
            }
            self.finish(&mut game, Status::Lose, FinishReason::Resigned);
        }

        self.send(PeerMessage::Resign).await
    }

    async fn exit(&self) {
        {
            let mut game = self.game.lock().await;
            self.finish(&mut game, Status::Lose, FinishReason::Exited);
        }

        if let Err(e) = self.connection.send(&PeerMessage::Exit).await {
            tracing::debug!("Exit notice not delivered: {}", e);
        }
        self.close();
    }

    /// Opponent exit, resignation or socket loss
    async fn opponent_gone(&self, reason: FinishReason) {
        {
            let mut game = self.game.lock().await;
            self.finish(&mut game, Status::Win, reason);
        }
        self.close();
    }

    /// Send to the opponent; a broken link counts as the opponent leaving
    async fn send(&self, message: PeerMessage) -> Result<(), CommandError> {
        match self.connection.send(&message).await {
            Ok(()) => Ok(()),
            Err(LinkError::Protocol(e)) => Err(CommandError::Message(e)),
            Err(e) => {
                tracing::warn!("Send to {} failed: {}", self.opponent, e);
                self.opponent_gone(FinishReason::OpponentUnreachable).await;
                Err(CommandError::PeerLost)
            }
        }
    }
}

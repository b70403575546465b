//! The bot logic, dispatching incoming packets to the window tracker and block cache,
//! and walking to its goal.

use std::time::{Duration, Instant};
use std::net::SocketAddr;

use glam::{DVec3, Vec2, IVec3};

use tracing::{debug, error, info, warn};

use redstone::path::{FlyingAversion, PathFinder, PathError};
use redstone::proto::{self, InPacket, OutPacket};
use redstone::tracker::WindowTracker;

use crate::movement::{Controller, Walker, WalkStatus};
use crate::net::{Connection, NetEvent};
use crate::world::BlockCache;
use crate::config;


/// Target tick duration. Currently 20 TPS, so 50 ms/tick.
pub const TICK_DURATION: Duration = Duration::from_millis(50);
/// Protocol version sent in the login request.
pub const PROTOCOL_VERSION: i32 = 29;
/// Height of the eyes above the feet.
const EYE_HEIGHT: f64 = 1.62;
/// Penalty of flying cells when searching a path to the goal.
const FLYING_AVERSION: f32 = 2.0;


/// The state of the connection with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    /// Handshake sent, waiting for the server's answer.
    Handshaking,
    /// Login request sent, waiting for the server's answer.
    LoggingIn,
    /// Logged in with the given entity id.
    Playing { entity_id: i32 },
}

/// The player's body, its position is authoritative on the server and the client only
/// proposes moves.
#[derive(Debug, Clone)]
pub struct Body {
    pub pos: DVec3,
    pub look: Vec2,
    pub on_ground: bool,
    /// Set when the server corrected the position after the client moved.
    pub bumped: bool,
    /// True if the position was changed by the client since the last server update.
    moved: bool,
}

impl Body {

    fn new(pos: DVec3, look: Vec2) -> Self {
        Self { pos, look, on_ground: true, bumped: false, moved: false }
    }

    /// Update the body from a server position, the server overriding a position that
    /// the client moved means that the move was blocked.
    fn teleport(&mut self, pos: DVec3, look: Vec2) {
        self.bumped = self.moved;
        self.moved = false;
        self.pos = pos;
        self.look = look;
    }

    fn position_look_packet(&self) -> OutPacket {
        OutPacket::PositionLook(proto::PositionLookPacket {
            pos: self.pos,
            stance: self.pos.y + EYE_HEIGHT,
            look: self.look,
            on_ground: self.on_ground,
        })
    }

}

impl Controller for Body {

    fn position(&self) -> DVec3 {
        self.pos
    }

    fn set_position(&mut self, pos: DVec3) {
        self.pos = pos;
        self.moved = true;
    }

    fn bumped(&self) -> bool {
        self.bumped
    }

    fn look_at(&mut self, target: DVec3) {
        let delta = target - (self.pos + DVec3::Y * EYE_HEIGHT);
        let horizontal = delta.x.hypot(delta.z);
        if horizontal == 0.0 && delta.y == 0.0 {
            return;
        }
        let yaw = (-delta.x).atan2(delta.z).to_degrees();
        let pitch = (-delta.y).atan2(horizontal).to_degrees();
        self.look = Vec2::new(yaw as f32, pitch as f32);
    }

}


/// A bot connected to a server.
pub struct Bot {
    /// Connection handle.
    conn: Connection,
    /// Login state.
    state: BotState,
    username: String,
    /// Address of the server, sent in the handshake.
    addr: SocketAddr,
    /// Windows and inventory of the player.
    tracker: WindowTracker,
    /// Blocks known to the bot.
    blocks: BlockCache,
    /// The body, once the server has sent the spawn position.
    body: Option<Body>,
    /// The walker following the path to the goal.
    walker: Option<Walker>,
    /// The block to walk to once spawned.
    goal: Option<IVec3>,
    /// Instant since which the tracker has been waiting for answers.
    unsynced_since: Option<Instant>,
    /// Instant of the last tick, used to compute the walking step.
    last_tick: Instant,
    /// True once the connection has been lost.
    lost: bool,
}

impl Bot {

    /// Connect to the given server and send the handshake.
    pub fn connect(addr: SocketAddr, username: &str) -> std::io::Result<Self> {

        let conn = Connection::connect(addr)?;
        info!("connected to {addr} as {username}");

        conn.send(OutPacket::Handshake(proto::HandshakePacket {
            data: format!("{username};{}:{}", addr.ip(), addr.port()),
        }));

        Ok(Self {
            conn,
            state: BotState::Handshaking,
            username: username.to_string(),
            addr,
            tracker: WindowTracker::new(),
            blocks: BlockCache::new(),
            body: None,
            walker: None,
            goal: config::goal(),
            unsynced_since: None,
            last_tick: Instant::now(),
            lost: false,
        })

    }

    pub fn state(&self) -> BotState {
        self.state
    }

    /// Return true once the connection has been lost, the bot should then be dropped.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Disconnect from the server with a quit message.
    pub fn quit(&mut self) {
        info!("quitting");
        self.conn.send(OutPacket::Disconnect(proto::DisconnectPacket {
            reason: "Quitting".to_string(),
        }));
        self.conn.disconnect();
    }

    /// Run a tick padded to last approximately [`TICK_DURATION`].
    pub fn tick_padded(&mut self) {

        let start = Instant::now();
        self.tick();
        let elapsed = start.elapsed();

        if let Some(missing) = TICK_DURATION.checked_sub(elapsed) {
            std::thread::sleep(missing);
        } else {
            warn!("tick too long {:?}, expected {:?}", elapsed, TICK_DURATION);
        }

    }

    /// Run a single tick: process received packets, move the body and flush the
    /// packets queued by the window tracker.
    pub fn tick(&mut self) {

        while let Some(event) = self.conn.poll() {
            match event {
                NetEvent::Packet(packet) => self.handle_packet(packet),
                NetEvent::Lost(error) => {
                    match error {
                        Some(e) => error!("connection lost: {e}"),
                        None => info!("connection closed"),
                    }
                    self.lost = true;
                    return;
                }
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;

        if let BotState::Playing { .. } = self.state {
            self.tick_walk(dt);
            self.tick_watchdog(now);
        }

        for packet in self.tracker.drain_outbox() {
            self.conn.send(packet);
        }

    }

    fn handle_packet(&mut self, packet: InPacket) {

        if let Err(e) = self.tracker.handle(&packet) {
            error!("window tracker: {e}");
            self.conn.disconnect();
            return;
        }

        if let Err(e) = self.blocks.handle(&packet) {
            error!("block cache: {e}");
            self.conn.disconnect();
            return;
        }

        match packet {
            InPacket::KeepAlive(packet) => self.conn.send(OutPacket::KeepAlive(packet)),
            InPacket::Handshake(packet) => self.handle_handshake(packet),
            InPacket::Login(packet) => self.handle_login(packet),
            InPacket::Chat(packet) => info!("chat: {}", packet.message),
            InPacket::PositionLook(packet) => self.handle_position_look(packet),
            InPacket::Disconnect(packet) => {
                info!("disconnected by server: {}", packet.reason);
                self.conn.disconnect();
            }
            _ => {}
        }

    }

    fn handle_handshake(&mut self, packet: proto::HandshakePacket) {

        if self.state != BotState::Handshaking {
            warn!("unexpected handshake: {}", packet.data);
            return;
        }

        debug!("handshake answer: {}", packet.data);
        self.state = BotState::LoggingIn;
        self.conn.send(OutPacket::Login(proto::LoginPacket {
            entity_id: PROTOCOL_VERSION,
            username: self.username.clone(),
            level_type: String::new(),
            mode: 0,
            dimension: 0,
            difficulty: 0,
            world_height: 0,
            max_players: 0,
        }));

    }

    fn handle_login(&mut self, packet: proto::LoginPacket) {

        if self.state != BotState::LoggingIn {
            warn!("unexpected login: {packet:?}");
            return;
        }

        info!("logged in to {} with entity id {}, level type: {}",
            self.addr, packet.entity_id, packet.level_type);
        self.state = BotState::Playing { entity_id: packet.entity_id };

    }

    fn handle_position_look(&mut self, packet: proto::PositionLookPacket) {

        match &mut self.body {
            Some(body) => body.teleport(packet.pos, packet.look),
            None => {
                info!("spawned at {}", packet.pos);
                self.body = Some(Body::new(packet.pos, packet.look));
            }
        }

        if let Some(body) = &mut self.body {
            body.on_ground = packet.on_ground;
            // The server expects its position to be sent back as an acknowledgment.
            self.conn.send(body.position_look_packet());
        }

        if let Some(goal) = self.goal.take() {
            self.walker = self.find_walker(goal);
        }

    }

    /// Search a path from the body to the goal and return a walker following it.
    fn find_walker(&self, goal: IVec3) -> Option<Walker> {

        let start = self.body.as_ref()?.pos.floor().as_ivec3();
        let oracle = FlyingAversion::new(&self.blocks, FLYING_AVERSION);

        match PathFinder::new(&oracle).find_path(start, goal) {
            Ok(path) => {
                info!("walking to {goal}, {} waypoints", path.len());
                Some(Walker::from_path(&path))
            }
            Err(PathError::GoalUnreachableSolid) => {
                warn!("goal {goal} is solid");
                None
            }
            Err(PathError::PathNotFound) => {
                warn!("no path from {start} to {goal}");
                None
            }
        }

    }

    fn tick_walk(&mut self, dt: f64) {

        let Some(walker) = &mut self.walker else { return };

        let controller = self.body.as_mut().map(|body| body as &mut dyn Controller);
        match walker.tick(controller, dt) {
            WalkStatus::Moving => {}
            WalkStatus::Arrived => {
                info!("arrived at destination");
                self.walker = None;
            }
            WalkStatus::NoController => return,
        }

        if let Some(body) = &mut self.body {
            // The bumped state only applies to the tick following the server update.
            body.bumped = false;
            self.conn.send(body.position_look_packet());
        }

    }

    /// Drop the pending actions and request fresh windows if an action has been waiting
    /// for the server's answer for too long.
    fn tick_watchdog(&mut self, now: Instant) {

        if self.tracker.synced() {
            self.unsynced_since = None;
            return;
        }

        let since = *self.unsynced_since.get_or_insert(now);
        if now.duration_since(since) >= config::watchdog() {
            warn!("{} actions still pending after {:?}, resynchronizing windows",
                self.tracker.pending_actions().count(), config::watchdog());
            self.tracker.resync();
            self.unsynced_since = None;
        }

    }

}

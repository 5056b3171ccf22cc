//! The realtime dispatcher (component I): one actor per connected socket,
//! an event-name dispatch table, and direct socket-to-socket addressing
//! for the handful of broadcasts a two-seat room ever needs.
//!
//! The teacher's `GameBroadcaster` fans events out to however many
//! subscribers are watching a game. A backgammon room only ever has two
//! sockets bound to it, so there is no pub/sub layer here — `SessionRegistry`
//! just remembers which actor address owns which socket id, and handlers
//! address the opponent's socket directly.

use actix::{Actor, Addr, AsyncContext, Context, Handler, Message, Recipient, StreamHandler};
use actix_web::{Error, HttpRequest, HttpResponse, web};
use actix_web_actors::ws;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::Config;
use crate::game::{DoubleOutcome, GameError, MoveOutcome, RollOutcome};
use crate::identity::IdentityStore;
use crate::rooms::{MatchmakingQueue, PlayerConnection, Role, Room, RoomRegistry};
use crate::storage::{self, MatchRecord, Storage};
use crate::types::{Color, GameStateJson, MoveJson};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MATCH_LENGTH: u32 = 1;

// ---------------------------------------------------------------------------
// Session registry — direct addressing, not pub/sub
// ---------------------------------------------------------------------------

#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct WsText(pub String);

#[derive(Message)]
#[rtype(result = "()")]
struct RegisterSocket {
    socket_id: String,
    recipient: Recipient<WsText>,
}

#[derive(Message)]
#[rtype(result = "()")]
struct UnregisterSocket {
    socket_id: String,
}

#[derive(Message)]
#[rtype(result = "()")]
struct SendText {
    socket_id: String,
    text: String,
}

#[derive(Default)]
pub struct SessionRegistry {
    sockets: HashMap<String, Recipient<WsText>>,
}

impl Actor for SessionRegistry {
    type Context = Context<Self>;
}

impl Handler<RegisterSocket> for SessionRegistry {
    type Result = ();
    fn handle(&mut self, msg: RegisterSocket, _ctx: &mut Self::Context) {
        self.sockets.insert(msg.socket_id, msg.recipient);
    }
}

impl Handler<UnregisterSocket> for SessionRegistry {
    type Result = ();
    fn handle(&mut self, msg: UnregisterSocket, _ctx: &mut Self::Context) {
        self.sockets.remove(&msg.socket_id);
    }
}

impl Handler<SendText> for SessionRegistry {
    type Result = ();
    fn handle(&mut self, msg: SendText, _ctx: &mut Self::Context) {
        if let Some(recipient) = self.sockets.get(&msg.socket_id) {
            recipient.do_send(WsText(msg.text));
        }
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub registry: Addr<SessionRegistry>,
    pub identity: Mutex<IdentityStore>,
    pub rooms: Mutex<RoomRegistry>,
    pub queue: Mutex<MatchmakingQueue>,
    pub storage: Storage,
    pub config: Config,
}

fn envelope(event: &str, payload: impl serde::Serialize) -> String {
    serde_json::to_string(&json!({ "event": event, "payload": payload }))
        .unwrap_or_else(|_| "{}".to_string())
}

fn role_color(role: Role) -> Color {
    match role {
        Role::Gold => Color::Gold,
        Role::Red => Color::Red,
    }
}

fn room_state_json(room: &Room) -> GameStateJson {
    GameStateJson::from(&room.game.state)
}

// ---------------------------------------------------------------------------
// WsSession actor
// ---------------------------------------------------------------------------

pub struct WsSession {
    socket_id: String,
    player_id: Option<Uuid>,
    last_heartbeat: Instant,
    app: web::Data<AppState>,
}

impl WsSession {
    fn new(app: web::Data<AppState>) -> Self {
        WsSession {
            socket_id: Uuid::new_v4().to_string(),
            player_id: None,
            last_heartbeat: Instant::now(),
            app,
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                log::info!("socket {} timed out, dropping", act.socket_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_self(&self, ctx: &mut ws::WebsocketContext<Self>, event: &str, payload: impl serde::Serialize) {
        ctx.text(envelope(event, payload));
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: impl Into<String>) {
        self.send_self(ctx, "error", json!({ "message": message.into() }));
    }

    fn send_to_socket(&self, socket_id: &str, event: &str, payload: impl serde::Serialize) {
        self.app.registry.do_send(SendText { socket_id: socket_id.to_string(), text: envelope(event, payload) });
    }

    fn require_player_id(&self, ctx: &mut ws::WebsocketContext<Self>) -> Option<Uuid> {
        match self.player_id {
            Some(id) => Some(id),
            None => {
                self.send_error(ctx, "register before sending this event");
                None
            }
        }
    }

    fn display_name_for(&self, player_id: Uuid) -> String {
        self.app
            .identity
            .lock()
            .unwrap()
            .lookup_by_id(player_id)
            .map(|g| g.display_name)
            .unwrap_or_else(|| "Guest".to_string())
    }

    fn handle_error(&self, ctx: &mut ws::WebsocketContext<Self>, err: GameError) {
        match err {
            GameError::Validation(m) => self.send_self(ctx, "error", json!({ "message": m })),
            other => self.send_error(ctx, other.to_string()),
        }
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    fn handle_register(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        let token = payload.get("token").and_then(Value::as_str);
        let mut identity = self.app.identity.lock().unwrap();

        let guest = token.and_then(|t| identity.lookup_by_token(t));
        let guest = match guest {
            Some(g) => g,
            None => match identity.create_guest(&self.app.storage, storage::unix_timestamp()) {
                Ok(g) => g,
                Err(e) => {
                    drop(identity);
                    self.handle_error(ctx, e);
                    return;
                }
            },
        };
        drop(identity);

        self.player_id = Some(guest.id);
        self.send_self(
            ctx,
            "registered",
            json!({
                "playerId": guest.id,
                "displayName": guest.display_name,
                "username": guest.username,
                "token": guest.token,
            }),
        );
    }

    fn handle_claim_username(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.require_player_id(ctx) else { return };
        let Some(username) = payload.get("username").and_then(Value::as_str) else {
            self.send_error(ctx, "missing username");
            return;
        };

        let mut identity = self.app.identity.lock().unwrap();
        match identity.claim_username(&self.app.storage, player_id, username) {
            Ok(guest) => {
                drop(identity);
                self.send_self(ctx, "username-claimed", json!({ "username": guest.username }));
            }
            Err(e) => {
                drop(identity);
                self.send_self(ctx, "username-error", json!({ "message": e.to_string() }));
            }
        }
    }

    fn handle_create_room(&mut self, _payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.require_player_id(ctx) else { return };
        let conn = PlayerConnection {
            socket_id: self.socket_id.clone(),
            player_id,
            display_name: self.display_name_for(player_id),
        };

        let room_id = self.app.rooms.lock().unwrap().create(conn, DEFAULT_MATCH_LENGTH, storage::unix_timestamp());
        self.send_self(ctx, "room-created", json!({ "roomId": room_id }));
    }

    fn handle_join_room(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.require_player_id(ctx) else { return };
        let Some(room_id) = payload.get("roomId").and_then(Value::as_str) else {
            self.send_error(ctx, "missing roomId");
            return;
        };

        let conn = PlayerConnection {
            socket_id: self.socket_id.clone(),
            player_id,
            display_name: self.display_name_for(player_id),
        };

        let mut rooms = self.app.rooms.lock().unwrap();
        if let Err(e) = rooms.join(room_id, conn) {
            drop(rooms);
            self.handle_error(ctx, e);
            return;
        }

        let room = rooms.get(room_id).expect("just joined");
        let state = room_state_json(room);
        let gold = room.gold.clone();
        let red = room.red.clone();
        drop(rooms);

        if let (Some(gold), Some(red)) = (gold, red) {
            self.send_to_socket(
                &gold.socket_id,
                "room-joined",
                json!({ "roomId": room_id, "player": "gold", "state": state, "opponent": { "displayName": red.display_name } }),
            );
            self.send_to_socket(
                &red.socket_id,
                "room-joined",
                json!({ "roomId": room_id, "player": "red", "state": state, "opponent": { "displayName": gold.display_name } }),
            );
            self.send_to_socket(&gold.socket_id, "game-start", json!({ "state": state }));
            self.send_to_socket(&red.socket_id, "game-start", json!({ "state": state }));
        }
    }

    fn handle_quick_match(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.require_player_id(ctx) else { return };
        let conn = PlayerConnection {
            socket_id: self.socket_id.clone(),
            player_id,
            display_name: self.display_name_for(player_id),
        };

        let mut queue = self.app.queue.lock().unwrap();
        queue.join(conn);
        let pair = queue.try_match();
        drop(queue);

        let Some((a, b)) = pair else { return };

        let mut rooms = self.app.rooms.lock().unwrap();
        let room_id = rooms.create(a.clone(), DEFAULT_MATCH_LENGTH, storage::unix_timestamp());
        if let Err(e) = rooms.join(&room_id, b.clone()) {
            log::error!("quick-match failed to seat paired players: {e}");
            return;
        }
        let room = rooms.get(&room_id).expect("just created and joined");
        let state = room_state_json(room);
        drop(rooms);

        self.send_to_socket(&a.socket_id, "match-found", json!({ "roomId": room_id }));
        self.send_to_socket(&b.socket_id, "match-found", json!({ "roomId": room_id }));
        self.send_to_socket(
            &a.socket_id,
            "room-joined",
            json!({ "roomId": room_id, "player": "gold", "state": state, "opponent": { "displayName": b.display_name } }),
        );
        self.send_to_socket(
            &b.socket_id,
            "room-joined",
            json!({ "roomId": room_id, "player": "red", "state": state, "opponent": { "displayName": a.display_name } }),
        );
        self.send_to_socket(&a.socket_id, "game-start", json!({ "state": state }));
        self.send_to_socket(&b.socket_id, "game-start", json!({ "state": state }));
    }

    fn handle_leave_queue(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.require_player_id(ctx) else { return };
        self.app.queue.lock().unwrap().leave_by_player_id(player_id);
    }

    fn handle_list_rooms(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let rooms = self.app.rooms.lock().unwrap();
        let list: Vec<Value> = rooms
            .waiting_rooms()
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "createdAt": r.created_at,
                    "host": { "displayName": r.gold.as_ref().map(|c| c.display_name.clone()).unwrap_or_default() },
                })
            })
            .collect();
        drop(rooms);
        self.send_self(ctx, "room-list", json!({ "rooms": list }));
    }

    fn handle_list_players(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let guests = match self.app.storage.load_all_guests() {
            Ok(g) => g,
            Err(e) => {
                self.handle_error(ctx, GameError::Internal(e));
                return;
            }
        };
        let matches = match self.app.storage.load_all_matches() {
            Ok(m) => m,
            Err(e) => {
                self.handle_error(ctx, GameError::Internal(e));
                return;
            }
        };
        let rows = storage::roster(&guests, &matches);
        self.send_self(ctx, "player-list", json!({ "players": rows }));
    }

    fn current_role(&self, rooms: &RoomRegistry) -> Option<(String, Role)> {
        let room = rooms.find_by_socket_id(&self.socket_id)?;
        let role = rooms.role_of(&room.id, &self.socket_id)?;
        Some((room.id.clone(), role))
    }

    fn handle_roll_dice(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        if self.require_player_id(ctx).is_none() {
            return;
        }
        let forced = parse_forced_pair(payload);

        let mut rooms = self.app.rooms.lock().unwrap();
        let Some((room_id, role)) = self.current_role(&rooms) else {
            drop(rooms);
            self.send_error(ctx, "not seated in a room");
            return;
        };
        let room = rooms.get_mut(&room_id).expect("looked up above");
        let opening = room.game.state.phase == crate::types::Phase::OpeningRoll;

        let result = if opening {
            room.game.roll_opening(forced)
        } else {
            room.game.roll_dice(role_color(role), forced)
        };

        let result = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(rooms);
                self.handle_error(ctx, e);
                return;
            }
        };

        let gold_socket = room.gold.as_ref().map(|c| c.socket_id.clone());
        let red_socket = room.red.as_ref().map(|c| c.socket_id.clone());
        let state = room_state_json(room);
        drop(rooms);

        let Some(gold_socket) = gold_socket else { return };
        let Some(red_socket) = red_socket else { return };

        match result {
            RollOutcome::OpeningTied { gold_die, red_die } => {
                let payload = json!({ "goldDie": gold_die, "redDie": red_die });
                self.send_to_socket(&gold_socket, "opening-roll-tied", payload.clone());
                self.send_to_socket(&red_socket, "opening-roll-tied", payload);
            }
            RollOutcome::OpeningResolved { gold_die, red_die, first_player, turn_ended } => {
                let payload = json!({
                    "goldDie": gold_die,
                    "redDie": red_die,
                    "firstPlayer": first_player,
                    "dice": state.dice,
                });
                self.send_to_socket(&gold_socket, "opening-roll-result", payload.clone());
                self.send_to_socket(&red_socket, "opening-roll-result", payload);
                if turn_ended {
                    let turn_payload = json!({ "state": state, "currentPlayer": state.current_player });
                    self.send_to_socket(&gold_socket, "turn-ended", turn_payload.clone());
                    self.send_to_socket(&red_socket, "turn-ended", turn_payload);
                }
            }
            RollOutcome::Normal { dice, turn_ended } => {
                let payload = json!({ "dice": dice });
                self.send_to_socket(&gold_socket, "dice-rolled", payload.clone());
                self.send_to_socket(&red_socket, "dice-rolled", payload);
                if turn_ended {
                    let turn_payload = json!({ "state": state, "currentPlayer": state.current_player });
                    self.send_to_socket(&gold_socket, "turn-ended", turn_payload.clone());
                    self.send_to_socket(&red_socket, "turn-ended", turn_payload);
                }
            }
        }
    }

    fn handle_make_move(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        if self.require_player_id(ctx).is_none() {
            return;
        }
        let Some(mv_value) = payload.get("move") else {
            self.send_error(ctx, "missing move");
            return;
        };
        let mv: MoveJson = match serde_json::from_value(mv_value.clone()) {
            Ok(m) => m,
            Err(_) => {
                self.send_error(ctx, "malformed move");
                return;
            }
        };

        let mut rooms = self.app.rooms.lock().unwrap();
        let Some((room_id, role)) = self.current_role(&rooms) else {
            drop(rooms);
            self.send_error(ctx, "not seated in a room");
            return;
        };
        let room = rooms.get_mut(&room_id).expect("looked up above");
        let result = room.game.make_move(role_color(role), mv.into());

        let result = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(rooms);
                self.handle_error(ctx, e);
                return;
            }
        };

        let gold_socket = room.gold.as_ref().map(|c| c.socket_id.clone());
        let red_socket = room.red.as_ref().map(|c| c.socket_id.clone());
        let gold_id = room.gold.as_ref().map(|c| c.player_id);
        let red_id = room.red.as_ref().map(|c| c.player_id);
        let state = room_state_json(room);
        drop(rooms);

        let (Some(gold_socket), Some(red_socket)) = (gold_socket, red_socket) else { return };

        let move_payload = json!({ "move": mv_value, "state": state });
        self.send_to_socket(&gold_socket, "move-made", move_payload.clone());
        self.send_to_socket(&red_socket, "move-made", move_payload);

        match result {
            MoveOutcome::Continue => {}
            MoveOutcome::TurnEnded => {
                let payload = json!({ "state": state, "currentPlayer": state.current_player });
                self.send_to_socket(&gold_socket, "turn-ended", payload.clone());
                self.send_to_socket(&red_socket, "turn-ended", payload);
            }
            MoveOutcome::GameOver { winner, win_type, points } => {
                let payload = json!({ "winner": winner, "winType": win_type.to_string(), "pointsWon": points });
                self.send_to_socket(&gold_socket, "game-over", payload.clone());
                self.send_to_socket(&red_socket, "game-over", payload);
                self.record_match(&room_id, gold_id, red_id, Some(winner), Some(win_type), Some(points));
            }
        }
    }

    fn handle_end_turn(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.require_player_id(ctx).is_none() {
            return;
        }
        let mut rooms = self.app.rooms.lock().unwrap();
        let Some((room_id, role)) = self.current_role(&rooms) else {
            drop(rooms);
            self.send_error(ctx, "not seated in a room");
            return;
        };
        let room = rooms.get_mut(&room_id).expect("looked up above");
        if let Err(e) = room.game.end_turn(role_color(role)) {
            drop(rooms);
            self.handle_error(ctx, e);
            return;
        }

        let gold_socket = room.gold.as_ref().map(|c| c.socket_id.clone());
        let red_socket = room.red.as_ref().map(|c| c.socket_id.clone());
        let state = room_state_json(room);
        drop(rooms);

        let (Some(gold_socket), Some(red_socket)) = (gold_socket, red_socket) else { return };
        let payload = json!({ "state": state, "currentPlayer": state.current_player });
        self.send_to_socket(&gold_socket, "turn-ended", payload.clone());
        self.send_to_socket(&red_socket, "turn-ended", payload);
    }

    fn handle_offer_double(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.require_player_id(ctx).is_none() {
            return;
        }
        let mut rooms = self.app.rooms.lock().unwrap();
        let Some((room_id, role)) = self.current_role(&rooms) else {
            drop(rooms);
            self.send_error(ctx, "not seated in a room");
            return;
        };
        let room = rooms.get_mut(&room_id).expect("looked up above");
        if let Err(e) = room.game.offer_double(role_color(role)) {
            drop(rooms);
            self.handle_error(ctx, e);
            return;
        }

        let cube_value = room.game.state.cube.value;
        let opponent_socket = room.opponent_of(role).map(|c| c.socket_id.clone());
        drop(rooms);

        if let Some(socket) = opponent_socket {
            self.send_to_socket(&socket, "double-offered", json!({ "currentCubeValue": cube_value }));
        }
    }

    fn handle_respond_double(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        if self.require_player_id(ctx).is_none() {
            return;
        }
        let Some(accept) = payload.get("accept").and_then(Value::as_bool) else {
            self.send_error(ctx, "missing accept");
            return;
        };

        let mut rooms = self.app.rooms.lock().unwrap();
        let Some((room_id, role)) = self.current_role(&rooms) else {
            drop(rooms);
            self.send_error(ctx, "not seated in a room");
            return;
        };
        let room = rooms.get_mut(&room_id).expect("looked up above");
        let result = room.game.respond_double(role_color(role), accept);

        let result = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(rooms);
                self.handle_error(ctx, e);
                return;
            }
        };

        let gold_socket = room.gold.as_ref().map(|c| c.socket_id.clone());
        let red_socket = room.red.as_ref().map(|c| c.socket_id.clone());
        let gold_id = room.gold.as_ref().map(|c| c.player_id);
        let red_id = room.red.as_ref().map(|c| c.player_id);
        let state = room_state_json(room);
        drop(rooms);

        let (Some(gold_socket), Some(red_socket)) = (gold_socket, red_socket) else { return };

        match result {
            DoubleOutcome::Accepted => {
                let payload = json!({ "accepted": true, "state": state });
                self.send_to_socket(&gold_socket, "double-response", payload.clone());
                self.send_to_socket(&red_socket, "double-response", payload);
            }
            DoubleOutcome::Declined { winner, win_type, points } => {
                let payload = json!({ "accepted": false, "state": state });
                self.send_to_socket(&gold_socket, "double-response", payload.clone());
                self.send_to_socket(&red_socket, "double-response", payload);
                let over_payload = json!({ "winner": winner, "winType": win_type.to_string(), "pointsWon": points });
                self.send_to_socket(&gold_socket, "game-over", over_payload.clone());
                self.send_to_socket(&red_socket, "game-over", over_payload);
                self.record_match(&room_id, gold_id, red_id, Some(winner), Some(win_type), Some(points));
            }
        }
    }

    fn handle_reconnect(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = payload
            .get("playerId")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .or(self.player_id)
        else {
            self.send_error(ctx, "missing playerId");
            return;
        };
        if self.app.identity.lock().unwrap().lookup_by_id(player_id).is_none() {
            self.send_error(ctx, "unknown playerId");
            return;
        }
        self.player_id = Some(player_id);

        let Some(room_id) = payload.get("roomId").and_then(Value::as_str) else {
            self.send_error(ctx, "missing roomId");
            return;
        };

        let mut rooms = self.app.rooms.lock().unwrap();
        let role = match rooms.rebind(room_id, player_id, self.socket_id.clone()) {
            Ok(role) => role,
            Err(e) => {
                drop(rooms);
                self.handle_error(ctx, e);
                return;
            }
        };

        let room = rooms.get(room_id).expect("just rebound");
        let state = room_state_json(room);
        let opponent = room.opponent_of(role);
        let opponent_socket = opponent.map(|c| c.socket_id.clone());
        let opponent_json = match opponent {
            Some(c) => json!({ "displayName": c.display_name }),
            None => Value::Null,
        };
        drop(rooms);

        self.send_self(
            ctx,
            "room-joined",
            json!({ "roomId": room_id, "player": role_color(role), "state": state, "opponent": opponent_json }),
        );
        if let Some(socket) = opponent_socket {
            self.send_to_socket(&socket, "opponent-reconnected", json!({}));
        }
    }

    fn handle_leave_room(&mut self, payload: &Value, ctx: &mut ws::WebsocketContext<Self>) {
        if self.require_player_id(ctx).is_none() {
            return;
        }
        let room_id = payload
            .get("roomId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.app.rooms.lock().unwrap().find_by_socket_id(&self.socket_id).map(|r| r.id.clone()));

        let Some(room_id) = room_id else {
            self.send_error(ctx, "not seated in a room");
            return;
        };

        let mut rooms = self.app.rooms.lock().unwrap();
        let opponent_socket = rooms.get(&room_id).and_then(|r| {
            rooms.role_of(&room_id, &self.socket_id).and_then(|role| r.opponent_of(role).map(|c| c.socket_id.clone()))
        });
        rooms.leave(&room_id, &self.socket_id);
        drop(rooms);

        if let Some(socket) = opponent_socket {
            self.send_to_socket(&socket, "opponent-left", json!({}));
        }
    }

    fn record_match(
        &self,
        room_id: &str,
        gold_id: Option<Uuid>,
        red_id: Option<Uuid>,
        winner: Option<Color>,
        win_type: Option<crate::types::WinType>,
        points: Option<u32>,
    ) {
        let (Some(gold_id), Some(red_id)) = (gold_id, red_id) else { return };
        let winner_id = match winner {
            Some(Color::Gold) => Some(gold_id),
            Some(Color::Red) => Some(red_id),
            None => None,
        };
        let record = MatchRecord {
            id: Uuid::new_v4(),
            gold_player_id: gold_id,
            red_player_id: red_id,
            winner_id,
            win_type,
            points_won: points,
            created_at: storage::unix_timestamp(),
            completed_at: Some(storage::unix_timestamp()),
        };
        if let Err(e) = self.app.storage.append_match(&record) {
            log::error!("failed to record match for room {room_id}: {e}");
        }
    }

    fn handle_message(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                self.send_error(ctx, "malformed message");
                return;
            }
        };

        let event = value.get("event").and_then(Value::as_str).unwrap_or_default();
        let empty = json!({});
        let payload = value.get("payload").unwrap_or(&empty);

        match event {
            "register" => self.handle_register(payload, ctx),
            "claim-username" => self.handle_claim_username(payload, ctx),
            "create-room" => self.handle_create_room(payload, ctx),
            "join-room" => self.handle_join_room(payload, ctx),
            "quick-match" => self.handle_quick_match(ctx),
            "leave-queue" => self.handle_leave_queue(ctx),
            "list-rooms" => self.handle_list_rooms(ctx),
            "list-players" => self.handle_list_players(ctx),
            "roll-dice" => self.handle_roll_dice(payload, ctx),
            "make-move" => self.handle_make_move(payload, ctx),
            "end-turn" => self.handle_end_turn(ctx),
            "offer-double" => self.handle_offer_double(ctx),
            "respond-double" => self.handle_respond_double(payload, ctx),
            "reconnect-to-game" => self.handle_reconnect(payload, ctx),
            "leave-room" => self.handle_leave_room(payload, ctx),
            other => self.send_error(ctx, format!("unknown event: {other}")),
        }
    }
}

fn parse_forced_pair(payload: &Value) -> Option<(u8, u8)> {
    let pair = payload.get("forcedPair")?.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    let a = pair[0].as_u64()? as u8;
    let b = pair[1].as_u64()? as u8;
    Some((a, b))
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.app.registry.do_send(RegisterSocket {
            socket_id: self.socket_id.clone(),
            recipient: ctx.address().recipient(),
        });
        self.start_heartbeat(ctx);
        log::debug!("socket {} connected", self.socket_id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.app.registry.do_send(UnregisterSocket { socket_id: self.socket_id.clone() });
        self.app.queue.lock().unwrap().leave_by_socket_id(&self.socket_id);

        let mut rooms = self.app.rooms.lock().unwrap();
        if let Some((room_id, role)) = self.current_role(&rooms) {
            let deadline = storage::unix_timestamp() + self.app.config.disconnect_grace_secs as i64;
            rooms.mark_disconnected(&room_id, deadline);
            let opponent_socket = rooms.get(&room_id).and_then(|r| r.opponent_of(role)).map(|c| c.socket_id.clone());
            drop(rooms);
            if let Some(socket) = opponent_socket {
                self.send_to_socket(&socket, "opponent-disconnected", json!({}));
            }
        }
        log::debug!("socket {} disconnected", self.socket_id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(p)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&p);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_message(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                log::warn!("websocket protocol error: {e}");
                ctx.stop();
            }
        }
    }
}

impl Handler<WsText> for WsSession {
    type Result = ();
    fn handle(&mut self, msg: WsText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// HTTP-upgrade entry point for the single websocket endpoint.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    app: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(WsSession::new(app), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forced_pair_reads_two_values() {
        let payload = json!({ "forcedPair": [3, 3] });
        assert_eq!(parse_forced_pair(&payload), Some((3, 3)));
    }

    #[test]
    fn parse_forced_pair_is_none_without_the_field() {
        assert_eq!(parse_forced_pair(&json!({})), None);
    }

    #[test]
    fn envelope_wraps_event_and_payload() {
        let text = envelope("registered", json!({ "playerId": "x" }));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "registered");
        assert_eq!(value["payload"]["playerId"], "x");
    }
}

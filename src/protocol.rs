//! Wire contract with the kiosk controller.
//!
//! Everything here is plain serde data: request bodies, response bodies and
//! feed frames exactly as the controller sends or expects them. Conversion
//! into the validated domain types lives in [`crate::state::game`] and
//! [`crate::state::hardware`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Bot strength selected on the start screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[default]
    Impossible,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::Impossible];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Impossible => "impossible",
        }
    }

    /// Parse the lowercase wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who drops the first coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Starter {
    #[default]
    Player,
    Bot,
}

/// `POST /new_game` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGameRequest {
    pub difficulty: Difficulty,
    pub who_starts: Starter,
    pub training_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// `POST /move` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub column: usize,
}

/// Failure body returned with any non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// A game-state frame as pushed on the `game_state` feed and returned by
/// `GET /status`.
///
/// Cells and `winner` use `0` empty/draw, `-1` player, `1` bot. `turn` uses
/// `0` player, `1` bot. Extra fields sent by `/status` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    pub board: Vec<Vec<i64>>,
    #[serde(default)]
    pub winner: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<i64>,
    #[serde(default)]
    pub valid_moves: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_message: Option<String>,
}

/// Frame pushed on the `magazine_status` feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagazineFrame {
    pub magazine1_full: bool,
    pub magazine2_full: bool,
}

/// Outbound control frame on the camera feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselControl {
    pub carousel_index: usize,
}

/// One ranked row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub nickname: String,
    pub score: i64,
}

/// The requesting player's own placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRank {
    pub rank: u32,
    pub nickname: String,
    pub score: i64,
}

/// `GET /leaderboard` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub difficulty: String,
    pub top_10: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub current_player: Option<PlayerRank>,
    #[serde(default)]
    pub available_difficulties: Vec<String>,
}

/// `POST /option` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionUpdate {
    pub label: String,
    pub value: bool,
}

/// `GET /options_list` response.
pub type OptionsList = BTreeMap<String, bool>;

/// HTTP verb of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// What an outbound request is for. Completions are routed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Start,
    Move { column: usize },
    Reset,
    Status,
    Leaderboard { difficulty: Difficulty },
    OptionsList,
    SetOption { label: String, value: bool },
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Move { .. } => "move",
            Self::Reset => "reset",
            Self::Status => "status",
            Self::Leaderboard { .. } => "leaderboard",
            Self::OptionsList => "options_list",
            Self::SetOption { .. } => "set_option",
        }
    }
}

/// A request handed to the [`RequestGateway`](crate::state::RequestGateway).
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Monotonic marker echoed back on completion.
    pub seq: u64,
    pub kind: RequestKind,
    pub method: Method,
    pub url: Url,
    pub body: Option<serde_json::Value>,
}

/// How an outbound request ended, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The controller answered. `body` is the raw response text.
    Response { status: u16, body: String },
    /// The request never got an answer (connection refused, DNS, ...).
    Failed { reason: String },
    /// No answer within the request timeout.
    TimedOut,
}

impl RequestOutcome {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Response {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Response {
            status,
            body: body.into(),
        }
    }
}

/// Resolved controller URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    new_game: Url,
    status: Url,
    make_move: Url,
    reset: Url,
    leaderboard: Url,
    options_list: Url,
    option: Url,
    game_state_feed: Url,
    magazine_status_feed: Url,
    camera_feed: Url,
}

/// Paths of the three push feeds, relative to the API base.
#[derive(Debug, Clone, Copy)]
pub struct FeedPaths<'a> {
    pub game_state: &'a str,
    pub magazine_status: &'a str,
    pub camera: &'a str,
}

/// Error resolving controller URLs.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid endpoint path: {0}")]
    Parse(#[from] url::ParseError),

    #[error("cannot derive a websocket url from scheme {0:?}")]
    Scheme(String),
}

impl Endpoints {
    /// Resolve every endpoint against `base`. Feed URLs swap `http` for `ws`.
    pub fn new(base: &Url, feeds: FeedPaths<'_>) -> Result<Self, EndpointError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |path: &str| base.join(path.trim_start_matches('/'));
        let feed = |path: &str| -> Result<Url, EndpointError> {
            let mut url = join(path)?;
            let scheme = match url.scheme() {
                "http" => "ws",
                "https" => "wss",
                "ws" | "wss" => return Ok(url),
                other => return Err(EndpointError::Scheme(other.to_string())),
            };
            url.set_scheme(scheme)
                .map_err(|()| EndpointError::Scheme(url.scheme().to_string()))?;
            Ok(url)
        };

        Ok(Self {
            new_game: join("new_game")?,
            status: join("status")?,
            make_move: join("move")?,
            reset: join("reset")?,
            leaderboard: join("leaderboard")?,
            options_list: join("options_list")?,
            option: join("option")?,
            game_state_feed: feed(feeds.game_state)?,
            magazine_status_feed: feed(feeds.magazine_status)?,
            camera_feed: feed(feeds.camera)?,
        })
    }

    pub fn game_state_feed(&self) -> &Url {
        &self.game_state_feed
    }

    pub fn magazine_status_feed(&self) -> &Url {
        &self.magazine_status_feed
    }

    pub fn camera_feed(&self) -> &Url {
        &self.camera_feed
    }

    pub fn new_game(&self, seq: u64, body: &NewGameRequest) -> OutboundRequest {
        OutboundRequest {
            seq,
            kind: RequestKind::Start,
            method: Method::Post,
            url: self.new_game.clone(),
            body: Some(serde_json::json!(body)),
        }
    }

    pub fn status(&self, seq: u64) -> OutboundRequest {
        OutboundRequest {
            seq,
            kind: RequestKind::Status,
            method: Method::Get,
            url: self.status.clone(),
            body: None,
        }
    }

    pub fn make_move(&self, seq: u64, column: usize) -> OutboundRequest {
        OutboundRequest {
            seq,
            kind: RequestKind::Move { column },
            method: Method::Post,
            url: self.make_move.clone(),
            body: Some(serde_json::json!(MoveRequest { column })),
        }
    }

    pub fn reset(&self, seq: u64) -> OutboundRequest {
        OutboundRequest {
            seq,
            kind: RequestKind::Reset,
            method: Method::Post,
            url: self.reset.clone(),
            body: None,
        }
    }

    /// `GET /leaderboard?difficulty=..&current_player=..`
    pub fn leaderboard(
        &self,
        seq: u64,
        difficulty: Difficulty,
        current_player: Option<&str>,
    ) -> OutboundRequest {
        let mut url = self.leaderboard.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("difficulty", difficulty.as_str());
            if let Some(nickname) = current_player {
                query.append_pair("current_player", nickname);
            }
        }
        OutboundRequest {
            seq,
            kind: RequestKind::Leaderboard { difficulty },
            method: Method::Get,
            url,
            body: None,
        }
    }

    pub fn options_list(&self, seq: u64) -> OutboundRequest {
        OutboundRequest {
            seq,
            kind: RequestKind::OptionsList,
            method: Method::Get,
            url: self.options_list.clone(),
            body: None,
        }
    }

    pub fn set_option(&self, seq: u64, label: &str, value: bool) -> OutboundRequest {
        let update = OptionUpdate {
            label: label.to_string(),
            value,
        };
        OutboundRequest {
            seq,
            kind: RequestKind::SetOption {
                label: update.label.clone(),
                value,
            },
            method: Method::Post,
            url: self.option.clone(),
            body: Some(serde_json::json!(update)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FEEDS: FeedPaths<'static> = FeedPaths {
        game_state: "/ws/game_state",
        magazine_status: "/ws/magazine_status",
        camera: "/ws/camera",
    };

    fn endpoints(base: &str) -> Endpoints {
        Endpoints::new(&Url::parse(base).unwrap(), FEEDS).unwrap()
    }

    #[test]
    fn test_endpoints_resolve_against_base() {
        let ep = endpoints("http://localhost:8000");

        assert_eq!(ep.new_game.as_str(), "http://localhost:8000/new_game");
        assert_eq!(ep.game_state_feed().as_str(), "ws://localhost:8000/ws/game_state");
        assert_eq!(ep.camera_feed().as_str(), "ws://localhost:8000/ws/camera");
    }

    #[test]
    fn test_endpoints_keep_base_path_and_tls() {
        let ep = endpoints("https://kiosk.local/api");

        assert_eq!(ep.status.as_str(), "https://kiosk.local/api/status");
        assert_eq!(
            ep.magazine_status_feed().as_str(),
            "wss://kiosk.local/api/ws/magazine_status"
        );
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let result = Endpoints::new(&Url::parse("ftp://kiosk.local/").unwrap(), FEEDS);
        assert!(matches!(result, Err(EndpointError::Scheme(_))));
    }

    #[test]
    fn test_leaderboard_query() {
        let ep = endpoints("http://localhost:8000/");
        let req = ep.leaderboard(4, Difficulty::Hard, Some("Ada L"));

        assert_eq!(req.method, Method::Get);
        assert_eq!(
            req.url.as_str(),
            "http://localhost:8000/leaderboard?difficulty=hard&current_player=Ada+L"
        );
    }

    #[test]
    fn test_new_game_body() {
        let ep = endpoints("http://localhost:8000/");
        let req = ep.new_game(
            1,
            &NewGameRequest {
                difficulty: Difficulty::Medium,
                who_starts: Starter::Bot,
                training_mode: true,
                nickname: None,
            },
        );

        assert_eq!(
            req.body,
            Some(serde_json::json!({
                "difficulty": "medium",
                "who_starts": "bot",
                "training_mode": true
            }))
        );
    }

    #[test]
    fn test_status_frame_ignores_extra_fields() {
        let frame: SnapshotFrame = serde_json::from_str(
            r#"{"board":[[0]],"winner":null,"turn":0,"valid_moves":[0],
                "game_over":false,"reset_required":false,"message":null}"#,
        )
        .unwrap();

        assert_eq!(frame.turn, Some(0));
        assert_eq!(frame.valid_moves, vec![0]);
    }

    #[test]
    fn test_leaderboard_response_optional_fields() {
        let resp: LeaderboardResponse = serde_json::from_str(
            r#"{"difficulty":"easy","top_10":[{"nickname":"bo","score":12}]}"#,
        )
        .unwrap();

        assert!(resp.current_player.is_none());
        assert!(resp.available_difficulties.is_empty());
        assert_eq!(resp.top_10[0].score, 12);
    }

    #[test]
    fn test_difficulty_wire_names() {
        for d in Difficulty::ALL {
            assert_eq!(Difficulty::from_wire(d.as_str()), Some(d));
        }
        assert_eq!(Difficulty::from_wire("nightmare"), None);
    }
}

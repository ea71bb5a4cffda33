//! Setup and identity documents, and workout-window parsing.
//!
//! The setup flow hands the engine a raw `workout_time` string in one of
//! three shapes:
//!
//! - a preset hourly slot (`"18:00 - 19:00"`, offered from 06:00 to 22:00)
//! - a custom range (`"HH:MM - HH:MM"`, any length, end after start)
//! - `"Current Time (HH:MM - HH:MM)"` -- the literal `Current Time` tag is
//!   the only signal for start-now mode
//!
//! The string is parsed exactly once, here, into a typed [`WorkoutWindow`].
//! Past this boundary the mode is a proper variant and nothing sniffs
//! strings again.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::geo::GeoPoint;

/// Textual tag marking a start-now window in setup input.
const START_NOW_TAG: &str = "Current Time";

/// Preset slots span this hour range, one slot per hour.
const PRESET_HOURS: std::ops::Range<u32> = 6..22;

/// How a workout window was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// One of the offered hourly slots
    Preset,
    /// A user-typed range
    Custom,
    /// Activates immediately on its creation day
    StartNow,
}

/// The daily time range during which a check-in is expected.
///
/// Invariant: `end > start`. Preset and start-now windows are exactly one
/// hour; custom windows may be any positive length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub mode: WindowMode,
}

impl WorkoutWindow {
    /// Parse a setup `workout_time` string.
    ///
    /// # Errors
    /// Returns [`SetupError::InvalidTimeRange`] for unparseable input and
    /// [`SetupError::EmptyWindow`] when the range has no duration.
    pub fn parse(input: &str) -> Result<Self, SetupError> {
        let trimmed = input.trim();

        if trimmed.contains(START_NOW_TAG) {
            let inner = trimmed
                .split_once('(')
                .and_then(|(_, rest)| rest.split_once(')'))
                .map(|(inner, _)| inner)
                .ok_or_else(|| SetupError::InvalidTimeRange(input.to_string()))?;
            let (start, end) = parse_range(inner, input)?;
            return Ok(Self {
                start,
                end,
                mode: WindowMode::StartNow,
            });
        }

        let (start, end) = parse_range(trimmed, input)?;
        let mode = if is_preset_slot(start, end) {
            WindowMode::Preset
        } else {
            WindowMode::Custom
        };
        Ok(Self { start, end, mode })
    }

    /// Build a start-now window opening at `now` for one hour.
    ///
    /// Near midnight the hour is clipped to 23:59 so the window stays within
    /// its calendar day, and the start is pulled back to 23:58 at the latest
    /// so the clipped window keeps at least one minute.
    pub fn start_now(now: NaiveTime) -> Self {
        let start = now.min(NaiveTime::from_hms_opt(23, 58, 0).unwrap_or(now));
        let end = start + Duration::hours(1);
        let end = if end <= start {
            NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(start)
        } else {
            end
        };
        Self {
            start,
            end,
            mode: WindowMode::StartNow,
        }
    }

    /// The setup string a start-now selection emits, e.g.
    /// `"Current Time (18:23 - 19:23)"`.
    pub fn start_now_label(now: NaiveTime) -> String {
        let w = Self::start_now(now);
        format!(
            "{} ({} - {})",
            START_NOW_TAG,
            w.start.format("%H:%M"),
            w.end.format("%H:%M")
        )
    }

    /// Window length.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// `"HH:MM - HH:MM"` rendering.
    pub fn label(&self) -> String {
        format!("{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_range(range: &str, original: &str) -> Result<(NaiveTime, NaiveTime), SetupError> {
    let (lhs, rhs) = range
        .split_once('-')
        .ok_or_else(|| SetupError::InvalidTimeRange(original.to_string()))?;
    let start = parse_time(lhs.trim(), original)?;
    let end = parse_time(rhs.trim(), original)?;
    if end <= start {
        return Err(SetupError::EmptyWindow { start, end });
    }
    Ok((start, end))
}

fn parse_time(text: &str, original: &str) -> Result<NaiveTime, SetupError> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .map_err(|_| SetupError::InvalidTimeRange(original.to_string()))
}

fn is_preset_slot(start: NaiveTime, end: NaiveTime) -> bool {
    start.minute() == 0
        && start.second() == 0
        && PRESET_HOURS.contains(&start.hour())
        && end == start + Duration::hours(1)
}

/// The hourly slot catalog offered by the setup flow.
pub fn preset_slots() -> Vec<String> {
    PRESET_HOURS
        .map(|h| format!("{:02}:00 - {:02}:00", h, h + 1))
        .collect()
}

/// A gym as entered during setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// The setup document as persisted, raw `workout_time` string included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupDocument {
    pub gym: GymLocation,
    pub workout_time: String,
    pub phone_number: String,
    #[serde(default = "default_bet_amount")]
    pub bet_amount: i64,
    pub created_at: DateTime<Utc>,
}

fn default_bet_amount() -> i64 {
    50
}

/// Validated setup input: the engine's read-only configuration for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupProfile {
    pub gym_name: String,
    pub gym_location: GeoPoint,
    pub window: WorkoutWindow,
    pub phone_number: String,
    pub bet_amount: i64,
    /// When the contract was made. A start-now window activates on this day
    /// only; afterwards it recurs at its recorded clock time.
    pub created_at: DateTime<Utc>,
}

impl SetupProfile {
    /// Validate a raw setup document into a typed profile.
    ///
    /// # Errors
    /// Returns the first [`SetupError`] encountered: missing fields, bad
    /// coordinates, a non-positive bet, or an unparseable window.
    pub fn from_document(doc: &SetupDocument) -> Result<Self, SetupError> {
        if doc.gym.name.trim().is_empty() {
            return Err(SetupError::MissingField("gym.name"));
        }
        if !(-90.0..=90.0).contains(&doc.gym.lat) {
            return Err(SetupError::InvalidCoordinate {
                field: "gym.lat",
                value: doc.gym.lat,
            });
        }
        if !(-180.0..=180.0).contains(&doc.gym.lng) {
            return Err(SetupError::InvalidCoordinate {
                field: "gym.lng",
                value: doc.gym.lng,
            });
        }
        if doc.phone_number.trim().is_empty() {
            return Err(SetupError::MissingField("phone_number"));
        }
        if doc.bet_amount <= 0 {
            return Err(SetupError::InvalidBet(doc.bet_amount));
        }
        let window = WorkoutWindow::parse(&doc.workout_time)?;
        Ok(Self {
            gym_name: doc.gym.name.trim().to_string(),
            gym_location: GeoPoint::new(doc.gym.lat, doc.gym.lng),
            window,
            phone_number: doc.phone_number.trim().to_string(),
            bet_amount: doc.bet_amount,
            created_at: doc.created_at,
        })
    }
}

/// The logged-in user's session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
    pub logged_in_at: DateTime<Utc>,
}

impl UserIdentity {
    pub fn new(email: &str, logged_in_at: DateTime<Utc>) -> Self {
        Self {
            email: email.trim().to_string(),
            logged_in_at,
        }
    }

    /// Display name used in notifications and call context: the part of the
    /// email before the `@`.
    pub fn display_name(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

// Keyboard command interpreter for the differential-drive base
// Turns the set of held keys into one maneuver with a pair of wheel speeds.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::driver::{Direction, MotorDriver};
use super::firmata::Result;
use super::pins::PinWriter;

/// A key or control word the browser can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Forward,    // w
    Left,       // a
    Backward,   // s
    Right,      // d
    Slow,       // space
    Boost,      // shift
    Stop,       // stop
    StopDrive,  // stop drive
    StopRotate, // stop rotate
}

impl Token {
    pub fn as_str(self) -> &'static str {
        match self {
            Token::Forward => "w",
            Token::Left => "a",
            Token::Backward => "s",
            Token::Right => "d",
            Token::Slow => "space",
            Token::Boost => "shift",
            Token::Stop => "stop",
            Token::StopDrive => "stop drive",
            Token::StopRotate => "stop rotate",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command token {0:?}")]
pub struct UnknownToken(pub String);

impl FromStr for Token {
    type Err = UnknownToken;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "w" => Token::Forward,
            "a" => Token::Left,
            "s" => Token::Backward,
            "d" => Token::Right,
            "space" => Token::Slow,
            "shift" => Token::Boost,
            "stop" => Token::Stop,
            "stop drive" => Token::StopDrive,
            "stop rotate" => Token::StopRotate,
            other => return Err(UnknownToken(other.to_string())),
        })
    }
}

/// The tokens active for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet(BTreeSet<Token>);

impl CommandSet {
    /// Parse raw strings, skipping anything unrecognised
    pub fn parse<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .filter_map(|s| match s.as_ref().parse::<Token>() {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!("Ignoring {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn contains(&self, token: Token) -> bool {
        self.0.contains(&token)
    }

    pub fn iter(&self) -> impl Iterator<Item = Token> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Token> for CommandSet {
    fn from_iter<T: IntoIterator<Item = Token>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Speed selected by the modifier keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeedMode {
    Slow,
    #[default]
    Normal,
    Boost,
}

impl SpeedMode {
    pub fn resolve(commands: &CommandSet) -> Self {
        if commands.contains(Token::Slow) {
            SpeedMode::Slow
        } else if commands.contains(Token::Boost) {
            SpeedMode::Boost
        } else {
            SpeedMode::Normal
        }
    }

    /// Wheel speed on the 0..=255 scale
    pub fn value(self) -> u8 {
        match self {
            SpeedMode::Slow => 100,
            SpeedMode::Normal => 150,
            SpeedMode::Boost => 200,
        }
    }
}

/// Named after the key that selects it, not the heading change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maneuver {
    Stop,
    Straight(Direction),
    ArcLeft(Direction),
    ArcRight(Direction),
    RotateLeft,  // a: rotate(1), channel A forward
    RotateRight, // d: rotate(-1), channel B forward
}

/// One interpreted request: what to do and how fast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motion {
    pub maneuver: Maneuver,
    pub speed: SpeedMode,
}

impl Motion {
    /// (left, right) wheel speeds, 0..=255
    pub fn wheel_speeds(&self) -> (u8, u8) {
        let full = self.speed.value();
        let half = full / 2;
        match self.maneuver {
            Maneuver::Stop => (0, 0),
            Maneuver::Straight(_) | Maneuver::RotateLeft | Maneuver::RotateRight => (full, full),
            Maneuver::ArcLeft(_) => (full, half),
            Maneuver::ArcRight(_) => (half, full),
        }
    }

    /// Signed speed reported to the browser
    ///
    /// Mean of the two wheels, negative when backing up. In-place rotation
    /// reports a positive speed.
    pub fn actual_speed(&self) -> i32 {
        let (left, right) = self.wheel_speeds();
        let mean = (left as i32 + right as i32) / 2;
        match self.maneuver {
            Maneuver::Stop => 0,
            Maneuver::Straight(d) | Maneuver::ArcLeft(d) | Maneuver::ArcRight(d) => d.sign() * mean,
            Maneuver::RotateLeft | Maneuver::RotateRight => mean,
        }
    }

    /// Send this motion to the motors
    pub fn apply<P: PinWriter>(&self, driver: &mut MotorDriver<P>) -> Result<()> {
        let (left, right) = self.wheel_speeds();
        let (left, right) = (left as i32, right as i32);
        match self.maneuver {
            Maneuver::Stop => driver.stop(),
            Maneuver::Straight(d) | Maneuver::ArcLeft(d) | Maneuver::ArcRight(d) => {
                driver.drive(d as i8, left, right)
            }
            Maneuver::RotateLeft => driver.rotate(Direction::Forward as i8, left, right),
            Maneuver::RotateRight => driver.rotate(Direction::Backward as i8, left, right),
        }
    }
}

/// Pick exactly one maneuver for a set of held keys
///
/// `stop`, or both `stop drive` and `stop rotate`, halts. `stop drive` masks
/// w/s and `stop rotate` masks a/d. Opposing keys cancel. Driving takes
/// precedence over rotating; a steering key during a drive makes an arc with
/// the inner wheel at half speed.
pub fn interpret(commands: &CommandSet) -> Motion {
    let speed = SpeedMode::resolve(commands);
    let halt = Motion {
        maneuver: Maneuver::Stop,
        speed,
    };

    let stop_drive = commands.contains(Token::StopDrive);
    let stop_rotate = commands.contains(Token::StopRotate);
    if commands.contains(Token::Stop) || (stop_drive && stop_rotate) {
        return halt;
    }

    let forward = commands.contains(Token::Forward) && !stop_drive;
    let backward = commands.contains(Token::Backward) && !stop_drive;
    let left = commands.contains(Token::Left) && !stop_rotate;
    let right = commands.contains(Token::Right) && !stop_rotate;

    let direction = match (forward, backward) {
        (true, false) => Some(Direction::Forward),
        (false, true) => Some(Direction::Backward),
        _ => None,
    };

    let maneuver = match (direction, left, right) {
        (Some(d), true, false) => Maneuver::ArcLeft(d),
        (Some(d), false, true) => Maneuver::ArcRight(d),
        (Some(d), _, _) => Maneuver::Straight(d),
        (None, true, false) => Maneuver::RotateLeft,
        (None, false, true) => Maneuver::RotateRight,
        (None, _, _) => Maneuver::Stop,
    };

    Motion { maneuver, speed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::driver::{duty, PinLayout};
    use crate::motor::pins::SimPins;

    fn cmds(raw: &[&str]) -> CommandSet {
        CommandSet::parse(raw)
    }

    #[test]
    fn test_token_round_trip() {
        for raw in ["w", "a", "s", "d", "space", "shift", "stop", "stop drive", "stop rotate"] {
            let token: Token = raw.parse().unwrap();
            assert_eq!(token.as_str(), raw);
        }
        assert!("W".parse::<Token>().is_err());
    }

    #[test]
    fn test_unknown_tokens_are_skipped() {
        let set = cmds(&["w", "jump", "", "w"]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Token::Forward]);
    }

    #[test]
    fn test_speed_mode_resolution() {
        assert_eq!(interpret(&cmds(&["w"])).speed.value(), 150);
        assert_eq!(interpret(&cmds(&["w", "space"])).speed.value(), 100);
        assert_eq!(interpret(&cmds(&["w", "shift"])).speed.value(), 200);
        // Slow wins when both modifiers are held
        assert_eq!(interpret(&cmds(&["shift", "space"])).speed, SpeedMode::Slow);
    }

    #[test]
    fn test_forward_right_arc_example() {
        let motion = interpret(&cmds(&["w", "d"]));
        assert_eq!(motion.maneuver, Maneuver::ArcRight(Direction::Forward));
        assert_eq!(motion.wheel_speeds(), (75, 150));
        assert_eq!(motion.actual_speed(), 112);
    }

    #[test]
    fn test_arcs_and_straights() {
        let cases = [
            (vec!["w"], Maneuver::Straight(Direction::Forward), (150, 150), 150),
            (vec!["s"], Maneuver::Straight(Direction::Backward), (150, 150), -150),
            (vec!["w", "a"], Maneuver::ArcLeft(Direction::Forward), (150, 75), 112),
            (vec!["s", "a"], Maneuver::ArcLeft(Direction::Backward), (150, 75), -112),
            (vec!["s", "d", "shift"], Maneuver::ArcRight(Direction::Backward), (100, 200), -150),
            (vec!["w", "a", "d"], Maneuver::Straight(Direction::Forward), (150, 150), 150),
        ];

        for (raw, maneuver, wheels, actual) in cases {
            let motion = interpret(&cmds(&raw));
            assert_eq!(motion.maneuver, maneuver, "{:?}", raw);
            assert_eq!(motion.wheel_speeds(), wheels, "{:?}", raw);
            assert_eq!(motion.actual_speed(), actual, "{:?}", raw);
        }
    }

    #[test]
    fn test_rotation_in_place() {
        let left = interpret(&cmds(&["a", "space"]));
        assert_eq!(left.maneuver, Maneuver::RotateLeft);
        assert_eq!(left.wheel_speeds(), (100, 100));
        assert_eq!(left.actual_speed(), 100);

        assert_eq!(interpret(&cmds(&["d"])).maneuver, Maneuver::RotateRight);
    }

    #[test]
    fn test_opposing_keys_cancel() {
        assert_eq!(interpret(&cmds(&["w", "s"])).maneuver, Maneuver::Stop);
        assert_eq!(interpret(&cmds(&["a", "d"])).maneuver, Maneuver::Stop);
        // With drive cancelled, steering alone rotates
        assert_eq!(interpret(&cmds(&["w", "s", "a"])).maneuver, Maneuver::RotateLeft);
    }

    #[test]
    fn test_stop_precedence() {
        let stopped = interpret(&cmds(&["stop", "w", "shift"]));
        assert_eq!(stopped.maneuver, Maneuver::Stop);
        assert_eq!(stopped.actual_speed(), 0);
        assert_eq!(stopped.speed, SpeedMode::Boost);

        let both = interpret(&cmds(&["w", "a", "stop drive", "stop rotate"]));
        assert_eq!(both.maneuver, Maneuver::Stop);
    }

    #[test]
    fn test_partial_stops_mask_their_keys() {
        // Order in the request does not matter
        assert_eq!(
            interpret(&cmds(&["w", "a", "stop drive"])).maneuver,
            Maneuver::RotateLeft
        );
        assert_eq!(
            interpret(&cmds(&["stop drive", "w", "a"])).maneuver,
            Maneuver::RotateLeft
        );
        assert_eq!(
            interpret(&cmds(&["s", "d", "stop rotate"])).maneuver,
            Maneuver::Straight(Direction::Backward)
        );
        assert_eq!(interpret(&cmds(&["stop drive"])).maneuver, Maneuver::Stop);
    }

    #[test]
    fn test_empty_set_stops() {
        let motion = interpret(&CommandSet::default());
        assert_eq!(motion.maneuver, Maneuver::Stop);
        assert_eq!(motion.speed, SpeedMode::Normal);
    }

    #[test]
    fn test_apply_drives_motors() {
        let pins = SimPins::new();
        let mut driver = MotorDriver::new(pins.clone(), PinLayout::default());

        interpret(&cmds(&["w", "d"])).apply(&mut driver).unwrap();
        let out = driver.outputs();
        assert!(out.standby && out.dir_a && out.dir_b);
        assert_eq!(out.duty_a, duty(75));
        assert_eq!(out.duty_b, duty(150));

        interpret(&cmds(&["a"])).apply(&mut driver).unwrap();
        let out = driver.outputs();
        assert!(out.dir_a && !out.dir_b);

        interpret(&cmds(&["d"])).apply(&mut driver).unwrap();
        let out = driver.outputs();
        assert!(!out.dir_a && out.dir_b);

        interpret(&cmds(&["stop"])).apply(&mut driver).unwrap();
        assert!(driver.outputs().is_zero());
    }
}

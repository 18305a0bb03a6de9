//! Wager data model and settlement math

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Instrument, ValidationError, WagerError, WagerResult};

/// Length of every wager window (1 hour)
pub const WAGER_WINDOW_SECS: i64 = 3600;

/// Unique wager identifier, assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WagerId(pub u64);

impl fmt::Display for WagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wager-{}", self.0)
    }
}

/// Stake leverage, which also selects the required price move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Multiplier {
    X1,
    X2,
    X3,
    X5,
}

impl Multiplier {
    pub const ALL: [Multiplier; 4] = [Multiplier::X1, Multiplier::X2, Multiplier::X3, Multiplier::X5];

    /// Numeric leverage factor
    pub fn value(&self) -> u32 {
        match self {
            Multiplier::X1 => 1,
            Multiplier::X2 => 2,
            Multiplier::X3 => 3,
            Multiplier::X5 => 5,
        }
    }

    /// Fractional price move the wager needs to win (0.02 = 2%)
    pub fn move_percentage(&self) -> Decimal {
        match self {
            Multiplier::X1 => Decimal::new(15, 3),
            Multiplier::X2 => Decimal::new(20, 3),
            Multiplier::X3 => Decimal::new(25, 3),
            Multiplier::X5 => Decimal::new(30, 3),
        }
    }
}

impl TryFrom<u32> for Multiplier {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Multiplier::ALL
            .into_iter()
            .find(|m| m.value() == value)
            .ok_or(ValidationError::UnsupportedMultiplier(value))
    }
}

impl From<Multiplier> for u32 {
    fn from(m: Multiplier) -> Self {
        m.value()
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.value())
    }
}

/// Which way the price has to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            _ => Err(ValidationError::UnsupportedDirection(s.to_string())),
        }
    }
}

/// Wager lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Active,
    Settled,
}

impl WagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Active => "active",
            WagerStatus::Settled => "settled",
        }
    }
}

/// Price a wager has to reach, derived once at creation
pub fn target_price(
    start_price: Decimal,
    multiplier: Multiplier,
    direction: Direction,
) -> Result<Decimal, ValidationError> {
    let pct = multiplier.move_percentage();
    let factor = match direction {
        Direction::Up => Decimal::ONE + pct,
        Direction::Down => Decimal::ONE - pct,
    };
    start_price
        .checked_mul(factor)
        .ok_or(ValidationError::StartPriceTooLarge(start_price))
}

/// Gross amount returned to the bettor on a win
pub fn potential_payout(amount: Decimal, multiplier: Multiplier) -> Result<Decimal, ValidationError> {
    amount
        .checked_mul(Decimal::from(multiplier.value()))
        .ok_or(ValidationError::AmountTooLarge(amount))
}

/// Outcome fields written exactly once, when a wager settles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub final_price: Decimal,
    pub won: bool,
    pub profit: Decimal,
    pub completed_at: DateTime<Utc>,
}

/// Raw wager request as received from a client
///
/// Fields are kept loosely typed so validation can report exactly which
/// constraint failed. Any client-supplied target price is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWagerRequest {
    pub instrument_id: String,
    pub amount: Decimal,
    pub multiplier: u32,
    pub direction: String,
    pub start_price: Decimal,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl CreateWagerRequest {
    /// Validate the request, deriving the target price and window
    ///
    /// `now` is used as the start time when the client did not send one.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<NewWager, ValidationError> {
        let instrument: Instrument = self.instrument_id.parse()?;

        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }

        let multiplier = Multiplier::try_from(self.multiplier)?;
        let direction: Direction = self.direction.parse()?;

        let start_time = self.start_time.unwrap_or(now);
        let end_time = self
            .end_time
            .unwrap_or_else(|| start_time + Duration::seconds(WAGER_WINDOW_SECS));

        NewWager::new(
            instrument,
            self.amount,
            multiplier,
            direction,
            self.start_price,
            start_time,
            end_time,
        )
    }
}

/// A validated wager that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWager {
    instrument: Instrument,
    amount: Decimal,
    multiplier: Multiplier,
    direction: Direction,
    start_price: Decimal,
    target_price: Decimal,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl NewWager {
    pub fn new(
        instrument: Instrument,
        amount: Decimal,
        multiplier: Multiplier,
        direction: Direction,
        start_price: Decimal,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        if start_price <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveStartPrice(start_price));
        }
        if end_time - start_time != Duration::seconds(WAGER_WINDOW_SECS) {
            return Err(ValidationError::InvalidWindow {
                expected_secs: WAGER_WINDOW_SECS,
            });
        }

        // Both must be representable so the wager can always be settled
        let target_price = target_price(start_price, multiplier, direction)?;
        potential_payout(amount, multiplier)?;

        Ok(Self {
            instrument,
            amount,
            multiplier,
            direction,
            start_price,
            target_price,
            start_time,
            end_time,
        })
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn start_price(&self) -> Decimal {
        self.start_price
    }

    pub fn target_price(&self) -> Decimal {
        self.target_price
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Attach the store-assigned id, producing an active wager
    pub fn into_wager(self, id: WagerId) -> Wager {
        Wager {
            id,
            instrument_id: self.instrument,
            amount: self.amount,
            multiplier: self.multiplier,
            direction: self.direction,
            start_price: self.start_price,
            target_price: self.target_price,
            start_time: self.start_time,
            end_time: self.end_time,
            status: WagerStatus::Active,
            settlement: None,
        }
    }
}

/// A persisted wager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wager {
    pub id: WagerId,
    pub instrument_id: Instrument,
    pub amount: Decimal,
    pub multiplier: Multiplier,
    pub direction: Direction,
    pub start_price: Decimal,
    pub target_price: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: WagerStatus,
    /// Present if and only if `status` is settled
    #[serde(flatten)]
    pub settlement: Option<Settlement>,
}

impl Wager {
    pub fn is_active(&self) -> bool {
        self.status == WagerStatus::Active
    }

    pub fn is_settled(&self) -> bool {
        self.status == WagerStatus::Settled
    }

    /// Whether the wager window has elapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Win condition at `current`, closed at the target in both directions
    pub fn wins_at(&self, current: Decimal) -> bool {
        match self.direction {
            Direction::Up => current >= self.target_price,
            Direction::Down => current <= self.target_price,
        }
    }

    /// Net profit for the given outcome
    pub fn profit_for(&self, won: bool) -> WagerResult<Decimal> {
        if !won {
            return Ok(-self.amount);
        }
        let payout = potential_payout(self.amount, self.multiplier)?;
        payout
            .checked_sub(self.amount)
            .ok_or(WagerError::Validation(ValidationError::AmountTooLarge(self.amount)))
    }

    /// Compute the settlement this wager would receive at `current`
    pub fn settlement_at(&self, current: Decimal, now: DateTime<Utc>) -> WagerResult<Settlement> {
        let won = self.wins_at(current);
        Ok(Settlement {
            final_price: current,
            won,
            profit: self.profit_for(won)?,
            completed_at: now,
        })
    }

    /// Transition `active -> settled`, refusing a second settlement
    pub fn apply_settlement(&mut self, settlement: Settlement) -> WagerResult<()> {
        if self.is_settled() {
            return Err(WagerError::AlreadySettled(self.id));
        }
        self.status = WagerStatus::Settled;
        self.settlement = Some(settlement);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn make_wager(amount: Decimal, multiplier: Multiplier, direction: Direction) -> Wager {
        NewWager::new(
            Instrument::Bitcoin,
            amount,
            multiplier,
            direction,
            dec!(50000),
            start(),
            start() + Duration::seconds(WAGER_WINDOW_SECS),
        )
        .unwrap()
        .into_wager(WagerId(1))
    }

    fn request() -> CreateWagerRequest {
        CreateWagerRequest {
            instrument_id: "bitcoin".to_string(),
            amount: dec!(100),
            multiplier: 2,
            direction: "up".to_string(),
            start_price: dec!(50000),
            start_time: None,
            end_time: None,
        }
    }

    #[test]
    fn test_target_price_two_percent_up() {
        assert_eq!(target_price(dec!(50000), Multiplier::X2, Direction::Up), Ok(dec!(51000)));
        assert_eq!(target_price(dec!(50000), Multiplier::X2, Direction::Down), Ok(dec!(49000)));
    }

    #[test]
    fn test_target_price_direction_and_determinism() {
        for multiplier in Multiplier::ALL {
            for start in [dec!(0.0001), dec!(1), dec!(312.55), dec!(50000), dec!(98765.4321)] {
                let up = target_price(start, multiplier, Direction::Up).unwrap();
                let down = target_price(start, multiplier, Direction::Down).unwrap();
                assert!(up > start, "{} {} up", start, multiplier);
                assert!(down < start, "{} {} down", start, multiplier);
                assert_eq!(Ok(up), target_price(start, multiplier, Direction::Up));
                assert_eq!(Ok(down), target_price(start, multiplier, Direction::Down));
            }
        }
    }

    #[test]
    fn test_boundary_is_win_both_directions() {
        let up = make_wager(dec!(10), Multiplier::X2, Direction::Up);
        assert!(up.wins_at(up.target_price));

        let down = make_wager(dec!(10), Multiplier::X2, Direction::Down);
        assert!(down.wins_at(down.target_price));
    }

    #[test]
    fn test_settlement_at_and_just_below_target() {
        let wager = make_wager(dec!(100), Multiplier::X2, Direction::Up);
        let now = wager.end_time;

        let win = wager.settlement_at(dec!(51000), now).unwrap();
        assert!(win.won);
        assert_eq!(win.profit, dec!(100));
        assert_eq!(win.final_price, dec!(51000));

        let loss = wager.settlement_at(dec!(50999.99), now).unwrap();
        assert!(!loss.won);
        assert_eq!(loss.profit, dec!(-100));
    }

    #[test]
    fn test_profit_law() {
        for multiplier in Multiplier::ALL {
            let wager = make_wager(dec!(25), multiplier, Direction::Down);
            let expected = dec!(25) * Decimal::from(multiplier.value()) - dec!(25);
            assert_eq!(wager.profit_for(true).unwrap(), expected);
            assert_eq!(wager.profit_for(false).unwrap(), dec!(-25));
        }
    }

    #[test]
    fn test_apply_settlement_once() {
        let mut wager = make_wager(dec!(10), Multiplier::X1, Direction::Up);
        let first = wager.settlement_at(dec!(60000), wager.end_time).unwrap();
        wager.apply_settlement(first.clone()).unwrap();
        assert!(wager.is_settled());

        let second = wager
            .settlement_at(dec!(1), wager.end_time + Duration::seconds(5))
            .unwrap();
        assert!(matches!(
            wager.apply_settlement(second),
            Err(WagerError::AlreadySettled(WagerId(1)))
        ));
        assert_eq!(wager.settlement, Some(first));
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let wager = make_wager(dec!(10), Multiplier::X1, Direction::Up);
        assert!(!wager.is_expired(wager.end_time - Duration::milliseconds(1)));
        assert!(wager.is_expired(wager.end_time));
    }

    #[test]
    fn test_validate_derives_window_and_target() {
        let new = request().validate(start()).unwrap();
        assert_eq!(new.start_time(), start());
        assert_eq!(new.end_time(), start() + Duration::hours(1));
        assert_eq!(new.target_price(), dec!(51000));
    }

    #[test]
    fn test_validate_reports_failed_constraint() {
        let mut req = request();
        req.instrument_id = "solana".to_string();
        assert_eq!(
            req.validate(start()).unwrap_err(),
            ValidationError::UnsupportedInstrument("solana".to_string())
        );

        let mut req = request();
        req.amount = dec!(0);
        assert_eq!(req.validate(start()).unwrap_err(), ValidationError::NonPositiveAmount(dec!(0)));

        let mut req = request();
        req.multiplier = 4;
        assert_eq!(req.validate(start()).unwrap_err(), ValidationError::UnsupportedMultiplier(4));

        let mut req = request();
        req.direction = "sideways".to_string();
        assert!(matches!(
            req.validate(start()).unwrap_err(),
            ValidationError::UnsupportedDirection(_)
        ));

        let mut req = request();
        req.start_price = dec!(-1);
        assert_eq!(
            req.validate(start()).unwrap_err(),
            ValidationError::NonPositiveStartPrice(dec!(-1))
        );

        let mut req = request();
        req.start_time = Some(start());
        req.end_time = Some(start() + Duration::minutes(30));
        assert!(matches!(
            req.validate(start()).unwrap_err(),
            ValidationError::InvalidWindow { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_sizes() {
        let mut req = request();
        req.amount = Decimal::MAX / dec!(2);
        req.multiplier = 5;
        assert_eq!(
            req.validate(start()).unwrap_err(),
            ValidationError::AmountTooLarge(Decimal::MAX / dec!(2))
        );

        let mut req = request();
        req.start_price = Decimal::MAX;
        assert_eq!(
            req.validate(start()).unwrap_err(),
            ValidationError::StartPriceTooLarge(Decimal::MAX)
        );

        // Large but settleable stays valid
        let mut req = request();
        req.amount = Decimal::MAX / dec!(2);
        req.multiplier = 1;
        assert!(req.validate(start()).is_ok());
    }

    #[test]
    fn test_payout_overflow_is_an_error() {
        assert_eq!(potential_payout(dec!(25), Multiplier::X3), Ok(dec!(75)));
        assert_eq!(
            potential_payout(Decimal::MAX, Multiplier::X2),
            Err(ValidationError::AmountTooLarge(Decimal::MAX))
        );
    }

    #[test]
    fn test_settling_oversized_record_errors_instead_of_panicking() {
        let mut wager = make_wager(dec!(10), Multiplier::X5, Direction::Up);
        wager.amount = Decimal::MAX / dec!(2);

        assert!(matches!(
            wager.settlement_at(dec!(60000), wager.end_time),
            Err(WagerError::Validation(ValidationError::AmountTooLarge(_)))
        ));
        let loss = wager.settlement_at(dec!(1), wager.end_time).unwrap();
        assert_eq!(loss.profit, -(Decimal::MAX / dec!(2)));
    }

    #[test]
    fn test_wager_json_shape() {
        let mut wager = make_wager(dec!(100), Multiplier::X5, Direction::Up);
        let json = serde_json::to_value(&wager).unwrap();
        assert_eq!(json["instrumentId"], "bitcoin");
        assert_eq!(json["multiplier"], 5);
        assert_eq!(json["status"], "active");
        assert!(json.get("finalPrice").is_none());

        let settlement = wager.settlement_at(dec!(40000), wager.end_time).unwrap();
        wager.apply_settlement(settlement).unwrap();
        let json = serde_json::to_value(&wager).unwrap();
        assert_eq!(json["status"], "settled");
        assert_eq!(json["won"], false);

        let back: Wager = serde_json::from_value(json).unwrap();
        assert_eq!(back, wager);
    }
}

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

const MAX_DUE_DAYS: u32 = 90;
const MIN_AMOUNT: f64 = 100.0;
const MAX_AMOUNT: f64 = 5000.0;

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub trait RandomSource: Send + Sync {
    /// Uniform in `0..=max`.
    fn days(&self, max: u32) -> u32;
    /// Uniform in `low..=high`.
    fn amount(&self, low: f64, high: f64) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn days(&self, max: u32) -> u32 {
        rand::thread_rng().gen_range(0..=max)
    }

    fn amount(&self, low: f64, high: f64) -> f64 {
        rand::thread_rng().gen_range(low..=high)
    }
}

/// Reproducible sequence from a seed.
#[derive(Debug)]
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut rng)
    }
}

impl RandomSource for SeededRandom {
    fn days(&self, max: u32) -> u32 {
        self.with_rng(|rng| rng.gen_range(0..=max))
    }

    fn amount(&self, low: f64, high: f64) -> f64 {
        self.with_rng(|rng| rng.gen_range(low..=high))
    }
}

/// Always returns the same draw, clamped to the requested range.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    pub days: u32,
    pub amount: f64,
}

impl RandomSource for FixedRandom {
    fn days(&self, max: u32) -> u32 {
        self.days.min(max)
    }

    fn amount(&self, low: f64, high: f64) -> f64 {
        self.amount.clamp(low, high)
    }
}

/// Synthesizes the user's next card due date and invoice amount.
#[derive(Clone)]
pub struct UserInfo {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(ThreadRandom))
    }
}

impl UserInfo {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    #[must_use]
    pub fn lookup(&self) -> String {
        let today = self.clock.today();
        let days = self.random.days(MAX_DUE_DAYS);
        let due = today.checked_add_days(Days::new(u64::from(days))).unwrap_or(today);
        let amount = (self.random.amount(MIN_AMOUNT, MAX_AMOUNT) * 100.0).round() / 100.0;

        format!(
            "Data de vencimento: {}, Valor da fatura: R$ {amount:.2}",
            due.format("%d/%m/%Y")
        )
    }
}

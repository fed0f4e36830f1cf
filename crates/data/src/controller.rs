// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! The aggregation controller.
//!
//! Owns all per-symbol aggregators, manages subscriptions, and bridges the
//! external trigger scheduler: wall-clock bar closes and market session
//! transitions arrive as [`TimeEvent`]s and are fanned out to aggregators.

use std::{
    cell::RefCell,
    fmt::Debug,
    rc::Rc,
};

use barkit_common::{Clock, TimeEvent, TriggerKey, TriggerSchedule, TriggerScheduler};
use barkit_core::{DurationNanos, UnixNanos};
use barkit_model::{BarSpecification, Price, QuoteTick, Symbol};
use chrono::Weekday;
use indexmap::IndexMap;

use crate::{
    aggregation::{SpreadFloor, SymbolBarAggregator},
    events::{BarClosed, MarketStatus},
};

/// The trigger key prefix for wall-clock bar close triggers.
pub const BAR_TRIGGER_PREFIX: &str = "BAR-";
/// The trigger key for the weekly market open.
pub const MARKET_OPEN_TRIGGER: &str = "MARKET-OPEN";
/// The trigger key for the weekly market close.
pub const MARKET_CLOSE_TRIGGER: &str = "MARKET-CLOSE";

/// A weekly-recurring UTC time of day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WeeklyTime {
    /// The ISO weekday.
    pub weekday: Weekday,
    /// The UTC hour [0, 23].
    pub hour: u32,
    /// The UTC minute [0, 59].
    pub minute: u32,
}

impl WeeklyTime {
    /// Creates a new [`WeeklyTime`] instance.
    #[must_use]
    pub const fn new(weekday: Weekday, hour: u32, minute: u32) -> Self {
        Self {
            weekday,
            hour,
            minute,
        }
    }
}

/// The weekly market session, in UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MarketSchedule {
    /// When the session opens each week.
    pub open: WeeklyTime,
    /// When the session closes each week.
    pub close: WeeklyTime,
}

impl Default for MarketSchedule {
    /// The FX session: opens Sunday 21:00 UTC, closes Friday 20:00 UTC.
    fn default() -> Self {
        Self {
            open: WeeklyTime::new(Weekday::Sun, 21, 0),
            close: WeeklyTime::new(Weekday::Fri, 20, 0),
        }
    }
}

/// Manages bar aggregation across all subscribed symbols.
///
/// Creates per-symbol [`SymbolBarAggregator`]s on demand, reference-counts
/// wall-clock trigger registrations so each distinct bar duration holds
/// exactly one external trigger while any subscription needs it, and routes
/// trigger firings and session transitions to the aggregators.
///
/// Scheduler failures during subscription changes are logged and absorbed;
/// the reference counts remain authoritative and
/// [`BarAggregationController::reconcile_triggers`] resynchronizes the
/// external registrations with them.
pub struct BarAggregationController<H, S>
where
    H: FnMut(BarClosed) + Clone,
    S: TriggerScheduler,
{
    clock: Rc<RefCell<dyn Clock>>,
    scheduler: S,
    schedule: MarketSchedule,
    spread_floor: SpreadFloor,
    handler: H,
    aggregators: IndexMap<Symbol, SymbolBarAggregator<H>>,
    duration_refcount: IndexMap<DurationNanos, usize>,
    // Durations for which we believe an external trigger currently exists.
    duration_triggers: IndexMap<DurationNanos, TriggerKey>,
    market_open: bool,
}

impl<H, S> Debug for BarAggregationController<H, S>
where
    H: FnMut(BarClosed) + Clone,
    S: TriggerScheduler,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(BarAggregationController))
            .field("schedule", &self.schedule)
            .field("symbols", &self.aggregators.keys().collect::<Vec<_>>())
            .field("duration_refcount", &self.duration_refcount)
            .field("market_open", &self.market_open)
            .finish()
    }
}

impl<H, S> BarAggregationController<H, S>
where
    H: FnMut(BarClosed) + Clone,
    S: TriggerScheduler,
{
    /// Creates a new [`BarAggregationController`] instance.
    pub fn new(
        clock: Rc<RefCell<dyn Clock>>,
        scheduler: S,
        schedule: MarketSchedule,
        spread_floor: SpreadFloor,
        handler: H,
    ) -> Self {
        Self {
            clock,
            scheduler,
            schedule,
            spread_floor,
            handler,
            aggregators: IndexMap::new(),
            duration_refcount: IndexMap::new(),
            duration_triggers: IndexMap::new(),
            market_open: false,
        }
    }

    /// Returns the external scheduler handle.
    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Returns a mutable reference to the external scheduler handle.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Returns `true` if the market session is currently flagged open.
    #[must_use]
    pub const fn is_market_open(&self) -> bool {
        self.market_open
    }

    /// Returns the aggregator for `symbol`, if one exists.
    #[must_use]
    pub fn aggregator(&self, symbol: &Symbol) -> Option<&SymbolBarAggregator<H>> {
        self.aggregators.get(symbol)
    }

    /// Returns the reference count for the given bar duration.
    #[must_use]
    pub fn duration_refcount(&self, duration_ns: DurationNanos) -> usize {
        self.duration_refcount
            .get(&duration_ns)
            .copied()
            .unwrap_or(0)
    }

    /// Registers the weekly market open and close triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the external scheduler rejects either registration
    /// (a startup failure, unlike subscription-time failures which are
    /// absorbed).
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.scheduler.create_trigger(
            TriggerKey::from(MARKET_OPEN_TRIGGER),
            TriggerSchedule::Weekly {
                weekday: self.schedule.open.weekday,
                hour: self.schedule.open.hour,
                minute: self.schedule.open.minute,
            },
        )?;
        self.scheduler.create_trigger(
            TriggerKey::from(MARKET_CLOSE_TRIGGER),
            TriggerSchedule::Weekly {
                weekday: self.schedule.close.weekday,
                hour: self.schedule.close.hour,
                minute: self.schedule.close.minute,
            },
        )?;

        log::info!("Started with session schedule {:?}", self.schedule);
        Ok(())
    }

    /// Subscribes `symbol` to bars of the given specification.
    ///
    /// Creates the symbol's aggregator on first use. For a newly added
    /// time-based subscription the duration's trigger reference count is
    /// incremented, and the external trigger is created when the count rises
    /// from zero. Re-subscribing an existing specification changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if `tick_size` is not positive.
    pub fn subscribe(
        &mut self,
        symbol: Symbol,
        tick_size: Price,
        spec: BarSpecification,
    ) -> anyhow::Result<()> {
        if !self.aggregators.contains_key(&symbol) {
            let aggregator = SymbolBarAggregator::new_checked(
                symbol,
                tick_size,
                self.spread_floor,
                self.handler.clone(),
            )?;
            self.aggregators.insert(symbol, aggregator);
            log::info!("Created aggregator for {symbol}");
        }

        let aggregator = &mut self.aggregators[&symbol];
        if !aggregator.subscribe(spec) {
            return Ok(());
        }

        if let Some(duration_ns) = spec.duration_ns() {
            let count = self.duration_refcount.entry(duration_ns).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.create_bar_trigger(duration_ns);
            }
        }

        Ok(())
    }

    /// Unsubscribes `symbol` from bars of the given specification.
    ///
    /// The in-progress bar is discarded without emitting. For a removed
    /// time-based subscription the duration's trigger reference count is
    /// decremented, and the external trigger is removed when the count falls
    /// to zero. The aggregator itself is retained so spread history for the
    /// symbol survives resubscription.
    pub fn unsubscribe(&mut self, symbol: Symbol, spec: &BarSpecification) {
        let Some(aggregator) = self.aggregators.get_mut(&symbol) else {
            log::debug!("No aggregator for {symbol}, nothing to unsubscribe");
            return;
        };
        if !aggregator.unsubscribe(spec) {
            return;
        }

        let Some(duration_ns) = spec.duration_ns() else {
            return;
        };
        let Some(count) = self.duration_refcount.get_mut(&duration_ns) else {
            log::error!("No trigger reference count for duration {duration_ns}");
            return;
        };

        *count = count.saturating_sub(1);
        if *count == 0 {
            self.duration_refcount.shift_remove(&duration_ns);
            self.remove_bar_trigger(duration_ns);
        }
    }

    /// Handles a quote tick, routing it to the symbol's aggregator.
    ///
    /// Ticks for symbols with no aggregator are ignored.
    pub fn on_quote(&mut self, tick: QuoteTick) {
        match self.aggregators.get_mut(&tick.symbol) {
            Some(aggregator) => aggregator.handle_quote(tick),
            None => log::debug!("No aggregator for {}, tick ignored", tick.symbol),
        }
    }

    /// Handles a scheduled trigger firing.
    ///
    /// `BAR-{duration_ns}` events close matching wall-clock bars across all
    /// aggregators at the scheduled boundary; `MARKET-OPEN` and
    /// `MARKET-CLOSE` broadcast the session transition. Unrecognized trigger
    /// names are logged and dropped.
    pub fn on_trigger(&mut self, event: TimeEvent) {
        let name = event.name.as_str();

        if let Some(suffix) = name.strip_prefix(BAR_TRIGGER_PREFIX) {
            match suffix.parse::<DurationNanos>() {
                Ok(duration_ns) => {
                    for aggregator in self.aggregators.values_mut() {
                        aggregator.close_time_bars(duration_ns, event.ts_event);
                    }
                }
                Err(e) => log::error!("Invalid bar trigger name '{name}': {e}"),
            }
            return;
        }

        match name {
            MARKET_OPEN_TRIGGER => self.broadcast_market_status(true, event.ts_event),
            MARKET_CLOSE_TRIGGER => self.broadcast_market_status(false, event.ts_event),
            _ => log::warn!("Unrecognized trigger '{name}', dropping {event}"),
        }
    }

    /// Resynchronizes external trigger registrations with the reference
    /// counts.
    ///
    /// Retries creations that previously failed for refcounted durations and
    /// removals that previously failed for durations no longer referenced.
    pub fn reconcile_triggers(&mut self) {
        let missing: Vec<DurationNanos> = self
            .duration_refcount
            .iter()
            .filter(|(duration_ns, count)| {
                **count > 0 && !self.duration_triggers.contains_key(*duration_ns)
            })
            .map(|(duration_ns, _)| *duration_ns)
            .collect();
        for duration_ns in missing {
            log::warn!("Reconciling missing trigger for duration {duration_ns}");
            self.create_bar_trigger(duration_ns);
        }

        let stale: Vec<DurationNanos> = self
            .duration_triggers
            .keys()
            .filter(|duration_ns| self.duration_refcount(**duration_ns) == 0)
            .copied()
            .collect();
        for duration_ns in stale {
            log::warn!("Reconciling stale trigger for duration {duration_ns}");
            self.remove_bar_trigger(duration_ns);
        }
    }

    fn broadcast_market_status(&mut self, is_open: bool, ts_event: UnixNanos) {
        self.market_open = is_open;
        let status = MarketStatus { is_open, ts_event };
        for aggregator in self.aggregators.values_mut() {
            aggregator.on_market_status(status);
        }
    }

    fn create_bar_trigger(&mut self, duration_ns: DurationNanos) {
        let key = bar_trigger_key(duration_ns);
        let now = self.clock.borrow().timestamp_ns().as_u64();
        let start_ns = UnixNanos::from(now - now % duration_ns + duration_ns);

        match self.scheduler.create_trigger(
            key,
            TriggerSchedule::Every {
                interval_ns: duration_ns,
                start_ns,
            },
        ) {
            Ok(()) => {
                self.duration_triggers.insert(duration_ns, key);
                log::debug!("Created trigger {key} starting at {start_ns}");
            }
            Err(e) => log::error!("Failed to create trigger {key}: {e}"),
        }
    }

    fn remove_bar_trigger(&mut self, duration_ns: DurationNanos) {
        let Some(key) = self.duration_triggers.get(&duration_ns).copied() else {
            log::debug!("No trigger registered for duration {duration_ns}");
            return;
        };

        match self.scheduler.remove_trigger(&key) {
            Ok(()) => {
                self.duration_triggers.shift_remove(&duration_ns);
                log::debug!("Removed trigger {key}");
            }
            Err(e) => log::error!("Failed to remove trigger {key}: {e}"),
        }
    }
}

/// Returns the trigger key for the given wall-clock bar duration.
#[must_use]
pub fn bar_trigger_key(duration_ns: DurationNanos) -> TriggerKey {
    TriggerKey::new(format!("{BAR_TRIGGER_PREFIX}{duration_ns}"))
}

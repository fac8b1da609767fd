//! Cooling system supervisor.
//!
//! [`CoolingSystem`] wires the whole loop together: it owns the CAN
//! bus, the supervisory state machine, the fan PID, and the safety
//! monitor, and it runs the 10 Hz control loop.
//!
//! ```text
//!   CAN RX worker ──decode──▶ handlers ──┐
//!                                        ▼
//!                              ┌───────────────────┐
//!                              │   Core (mutex)    │
//!                              │ FSM · PID · Safety │──▶ pump/fan frames
//!                              └───────────────────┘        (CAN TX)
//!                                        ▲
//!   tick thread (100 ms, drift-free) ────┘
//! ```
//!
//! Sensor handlers run on the bus RX thread; safety checks and the
//! init-complete / error-recovery timers run on the tick thread. Both
//! funnel through one mutex around `Core`, because a state machine
//! transition is a compound read-modify-write across the whole context
//! — per-field atomics cannot express it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::canbus::CanBus;
use crate::config::SystemConfig;
use crate::control::pid::PidController;
use crate::fsm::context::ControlContext;
use crate::fsm::states::{build_state_machine, CoolingFsm, SystemEvent, SystemState};
use crate::safety::SafetyMonitor;
use crate::sensors;
use crate::tick::Ticker;

/// CAN node identifier of the controller itself.
const NODE_ID: u8 = 0x01;

// ───────────────────────────────────────────────────────────────
// Core — everything behind the supervisor lock
// ───────────────────────────────────────────────────────────────

struct Core {
    fsm: CoolingFsm,
    ctx: ControlContext,
    pid: PidController,
    safety: SafetyMonitor,
    /// Circulation time required before INITIALIZING completes.
    pump_init: Duration,
    /// A temperature arrived and the outputs have not been re-emitted
    /// since; the tick re-emits if the RX path could not.
    temp_pending: bool,
}

impl Core {
    fn new(config: SystemConfig) -> Self {
        let mut pid = PidController::new(
            config.pid_kp,
            config.pid_ki,
            config.pid_kd,
            config.temp_target,
        );
        // Output is a fan duty percentage; integral clamp keeps a long
        // excursion from winding the term past what the fan can act on.
        pid.set_output_limits(0.0, 100.0);
        pid.set_integral_limits(-50.0, 50.0);

        Self {
            fsm: build_state_machine(),
            safety: SafetyMonitor::new(&config),
            pump_init: Duration::from_secs_f64(config.pump_init_secs),
            ctx: ControlContext::new(config),
            pid,
            temp_pending: false,
        }
    }

    /// Run one event through the state machine; on success the entry
    /// actions have changed the outputs, so re-emit them.
    fn post_event(&mut self, event: SystemEvent, bus: &CanBus) -> bool {
        if self.fsm.process_event(event, &mut self.ctx) {
            self.update_outputs(bus);
            true
        } else {
            false
        }
    }

    /// Temperature frame arrived (RX thread).
    fn handle_temperature(&mut self, temp: f64, bus: &CanBus) {
        self.ctx.current_temp = temp;
        self.temp_pending = true;

        let state = self.fsm.current_state();
        if state == SystemState::Running && temp > self.ctx.config.temp_critical {
            self.post_event(SystemEvent::CriticalTemp, bus);
        } else if state == SystemState::EmergencyStop && temp < self.ctx.config.temp_max {
            self.post_event(SystemEvent::TempNormal, bus);
        }

        // Fan control against the post-transition state: a critical
        // excursion above must not have its 100% override recomputed.
        if self.fsm.current_state() == SystemState::Running {
            self.apply_fan_control(temp);
        }
        self.update_outputs(bus);
    }

    /// Fan hysteresis + PID, RUNNING state only.
    fn apply_fan_control(&mut self, temp: f64) {
        let fan_start = self.ctx.config.fan_start_temp;
        let hysteresis = self.ctx.config.fan_hysteresis;
        if temp > fan_start {
            self.ctx.outputs.fan_on = true;
            self.ctx.outputs.fan_speed = self.pid.calculate(temp).round() as u8;
        } else if temp < fan_start - hysteresis {
            self.ctx.outputs.fan_on = false;
            self.ctx.outputs.fan_speed = 0;
            self.pid.reset();
        }
        // Inside the hysteresis band: fan state unchanged.
    }

    /// Level frame arrived (RX thread).
    ///
    /// A falling edge while RUNNING arms the low-coolant debounce
    /// immediately; escalation to ERROR happens on the tick thread
    /// once the grace period elapses, so a brief slosh of the level
    /// switch does not shut the loop down.
    fn handle_level(&mut self, level_ok: bool) {
        if level_ok == self.ctx.level_ok {
            return;
        }
        self.ctx.level_ok = level_ok;
        info!(
            "Coolant level {}",
            if level_ok { "restored" } else { "LOW" }
        );

        if self.fsm.current_state() == SystemState::Running
            && !level_ok
            && self.ctx.low_level_since.is_none()
        {
            self.ctx.low_level_since = Some(Instant::now());
        }
    }

    /// Ignition frame arrived (RX thread).
    fn handle_ignition(&mut self, ignition: bool, bus: &CanBus) {
        if ignition == self.ctx.ignition {
            return;
        }
        self.ctx.ignition = ignition;
        info!("Ignition {}", if ignition { "ON" } else { "OFF" });

        let event = if ignition {
            SystemEvent::IgnitionOn
        } else {
            SystemEvent::IgnitionOff
        };
        self.post_event(event, bus);
    }

    /// One control tick (tick thread).
    fn tick(&mut self, now: Instant, bus: &CanBus, debug_status: bool) {
        match self.fsm.current_state() {
            SystemState::Initializing => {
                if let Some(start) = self.ctx.pump_start {
                    if now.duration_since(start) >= self.pump_init {
                        info!("Initialization complete, coolant circulating");
                        self.post_event(SystemEvent::InitComplete, bus);
                    }
                }
            }
            SystemState::Running => {
                if let Some(event) = self.safety.check_running(&mut self.ctx, now) {
                    self.post_event(event, bus);
                }
            }
            SystemState::Error => {
                if self.safety.recovery_ready(&self.ctx) {
                    info!("Error condition cleared, re-initializing");
                    self.post_event(SystemEvent::ErrorCleared, bus);
                }
            }
            SystemState::Off | SystemState::EmergencyStop => {}
        }

        // A temperature that arrived since the last emit is reflected
        // in the actuator frames at least once per tick.
        if self.temp_pending {
            if self.fsm.current_state() == SystemState::Running {
                self.apply_fan_control(self.ctx.current_temp);
            }
            self.update_outputs(bus);
        }

        if debug_status {
            info!(
                "Temp: {:.1}°C, Pump: {}, Fan: {}, Speed: {}%, CAN TX: {} RX: {}",
                self.ctx.current_temp,
                if self.ctx.outputs.pump_on { "ON" } else { "OFF" },
                if self.ctx.outputs.fan_on { "ON" } else { "OFF" },
                self.ctx.outputs.fan_speed,
                bus.tx_count(),
                bus.rx_count(),
            );
        }
    }

    /// Emit the pump and fan command frames. Fire-and-forget: a full
    /// queue or stopped bus costs one frame, the next emit repairs it.
    fn update_outputs(&mut self, bus: &CanBus) {
        let cfg = &self.ctx.config;
        let out = &self.ctx.outputs;

        let pump = [u8::from(out.pump_on)];
        if !bus.send_message(cfg.pump_control_id, &pump) {
            debug!("pump frame not enqueued");
        }

        let fan = [u8::from(out.fan_on), out.fan_speed];
        if !bus.send_message(cfg.fan_control_id, &fan) {
            debug!("fan frame not enqueued");
        }

        self.temp_pending = false;
    }
}

// ───────────────────────────────────────────────────────────────
// CoolingSystem — public supervisor
// ───────────────────────────────────────────────────────────────

/// The cooling loop supervisor.
///
/// Owns the bus and the control core exclusively; external code
/// interacts through the lifecycle methods, the setpoint command, the
/// state accessors, and (for simulation input) the bus handle.
pub struct CoolingSystem {
    bus: Arc<CanBus>,
    core: Arc<Mutex<Core>>,
    running: Arc<AtomicBool>,
    debug_mode: Arc<AtomicBool>,
    tick_period: Duration,
    tick_thread: Option<JoinHandle<()>>,
}

impl CoolingSystem {
    /// Construct the supervisor and register the sensor handlers.
    /// The configuration is assumed validated (see
    /// [`SystemConfig::validate`]).
    pub fn new(config: SystemConfig) -> Self {
        let bus = CanBus::new(NODE_ID);
        let tick_period = Duration::from_millis(config.control_loop_interval_ms);
        let core = Arc::new(Mutex::new(Core::new(config.clone())));

        register_sensor_handlers(&bus, &core, &config);

        Self {
            bus,
            core,
            running: Arc::new(AtomicBool::new(false)),
            debug_mode: Arc::new(AtomicBool::new(false)),
            tick_period,
            tick_thread: None,
        }
    }

    /// Start the bus and the control loop. No-op if already running.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bus.start();
        {
            let mut guard = self.core.lock().unwrap();
            let core = &mut *guard;
            core.fsm.start(&mut core.ctx);
            core.update_outputs(&self.bus);
        }

        let core = Arc::clone(&self.core);
        let bus = Arc::clone(&self.bus);
        let running = Arc::clone(&self.running);
        let debug_mode = Arc::clone(&self.debug_mode);
        let period = self.tick_period;

        self.tick_thread = Some(
            std::thread::Builder::new()
                .name("control-tick".into())
                .spawn(move || {
                    let mut ticker = Ticker::new(period);
                    while running.load(Ordering::SeqCst) {
                        ticker.wait();
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        let now = Instant::now();
                        core.lock().unwrap().tick(now, &bus, debug_mode.load(Ordering::Relaxed));
                    }
                })
                .expect("spawn control-tick"),
        );
        info!("Cooling system started");
    }

    /// Stop the control loop, then the bus. No-op if already stopped.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.tick_thread.take() {
            if handle.join().is_err() {
                warn!("control-tick thread panicked during shutdown");
            }
        }
        self.bus.stop();
        info!("Cooling system stopped");
    }

    /// Change the temperature target and the PID setpoint together.
    pub fn set_setpoint(&self, setpoint: f64) {
        let mut core = self.core.lock().unwrap();
        core.ctx.config.temp_target = setpoint;
        core.pid.set_setpoint(setpoint);
        info!("Temperature setpoint changed to {setpoint:.1}°C");
    }

    /// Enable per-tick status output.
    pub fn set_debug(&self, enabled: bool) {
        self.debug_mode.store(enabled, Ordering::Relaxed);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> SystemState {
        self.core.lock().unwrap().fsm.current_state()
    }

    pub fn current_temp(&self) -> f64 {
        self.core.lock().unwrap().ctx.current_temp
    }

    pub fn fan_speed(&self) -> u8 {
        self.core.lock().unwrap().ctx.outputs.fan_speed
    }

    pub fn pump_on(&self) -> bool {
        self.core.lock().unwrap().ctx.outputs.pump_on
    }

    pub fn fan_on(&self) -> bool {
        self.core.lock().unwrap().ctx.outputs.fan_on
    }

    /// Bus handle, for injecting simulated sensor frames and reading
    /// the traffic counters.
    pub fn bus(&self) -> Arc<CanBus> {
        Arc::clone(&self.bus)
    }
}

impl Drop for CoolingSystem {
    fn drop(&mut self) {
        self.stop();
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor handler registration
// ───────────────────────────────────────────────────────────────

/// Register the three sensor decoders. Handlers hold a weak bus
/// reference (the bus owns the handler table; a strong reference would
/// cycle) and run on the RX worker thread.
fn register_sensor_handlers(bus: &Arc<CanBus>, core: &Arc<Mutex<Core>>, config: &SystemConfig) {
    let weak_bus = Arc::downgrade(bus);
    let core_ref = Arc::clone(core);
    bus.register_handler(config.temp_sensor_id, move |frame| {
        if let Some(temp) = sensors::temperature::decode(frame) {
            if let Some(bus) = weak_bus.upgrade() {
                core_ref.lock().unwrap().handle_temperature(temp, &bus);
            }
        }
    });

    let core_ref = Arc::clone(core);
    bus.register_handler(config.level_sensor_id, move |frame| {
        if let Some(level_ok) = sensors::level::decode(frame) {
            core_ref.lock().unwrap().handle_level(level_ok);
        }
    });

    let weak_bus = Arc::downgrade(bus);
    let core_ref = Arc::clone(core);
    bus.register_handler(config.ignition_id, move |frame| {
        if let Some(ignition) = sensors::ignition::decode(frame) {
            if let Some(bus) = weak_bus.upgrade() {
                core_ref.lock().unwrap().handle_ignition(ignition, &bus);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Core-level tests drive the supervisor logic single-threaded,
    /// with an idle (never started) bus absorbing the output frames.
    fn make_core() -> (Core, Arc<CanBus>) {
        let mut core = Core::new(SystemConfig::default());
        let bus = CanBus::new(NODE_ID);
        core.fsm.start(&mut core.ctx);
        (core, bus)
    }

    fn make_running_core() -> (Core, Arc<CanBus>) {
        let (mut core, bus) = make_core();
        core.handle_level(true);
        core.handle_ignition(true, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Initializing);
        // Backdate the pump start so the tick sees the wait as elapsed.
        core.ctx.pump_start = Some(Instant::now() - Duration::from_secs(3));
        core.tick(Instant::now(), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Running);
        (core, bus)
    }

    #[test]
    fn ignition_on_enters_initializing_with_pump() {
        let (mut core, bus) = make_core();
        core.handle_ignition(true, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Initializing);
        assert!(core.ctx.outputs.pump_on);
    }

    #[test]
    fn ignition_on_refused_when_level_low() {
        let (mut core, bus) = make_core();
        core.handle_level(false);
        core.handle_ignition(true, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Off);
    }

    #[test]
    fn init_completes_only_after_circulation_wait() {
        let (mut core, bus) = make_core();
        core.handle_ignition(true, &bus);

        // Too early: stays initializing
        core.tick(Instant::now(), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Initializing);

        core.ctx.pump_start = Some(Instant::now() - Duration::from_secs(3));
        core.tick(Instant::now(), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Running);
    }

    #[test]
    fn fan_engages_above_start_temp() {
        let (mut core, bus) = make_running_core();
        core.handle_temperature(62.0, &bus);
        assert!(core.ctx.outputs.fan_on);
        // 62 °C is below the 65 °C setpoint: positive error drives a
        // nonzero speed.
        assert!(core.ctx.outputs.fan_speed > 0);
    }

    #[test]
    fn fan_speed_clamps_to_zero_above_setpoint() {
        let (mut core, bus) = make_running_core();
        core.handle_temperature(70.0, &bus);
        assert!(core.ctx.outputs.fan_on);
        // error = 65 − 70 < 0: the PID output clamps at the lower
        // bound (documented sign convention).
        assert_eq!(core.ctx.outputs.fan_speed, 0);
    }

    #[test]
    fn fan_holds_state_inside_hysteresis_band() {
        let (mut core, bus) = make_running_core();
        core.handle_temperature(62.0, &bus);
        assert!(core.ctx.outputs.fan_on);
        let speed = core.ctx.outputs.fan_speed;

        // 57 °C is inside (55, 60): no change either way
        core.handle_temperature(57.0, &bus);
        assert!(core.ctx.outputs.fan_on);
        assert_eq!(core.ctx.outputs.fan_speed, speed);
    }

    #[test]
    fn fan_disengages_below_hysteresis() {
        let (mut core, bus) = make_running_core();
        core.handle_temperature(62.0, &bus);
        assert!(core.ctx.outputs.fan_on);

        core.handle_temperature(54.0, &bus);
        assert!(!core.ctx.outputs.fan_on);
        assert_eq!(core.ctx.outputs.fan_speed, 0);
    }

    #[test]
    fn critical_temperature_preempts_to_emergency_stop() {
        let (mut core, bus) = make_running_core();
        core.handle_temperature(88.0, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::EmergencyStop);
        assert!(!core.ctx.outputs.pump_on);
        assert!(core.ctx.outputs.fan_on);
        assert_eq!(core.ctx.outputs.fan_speed, 100, "PID must not override the 100% command");
    }

    #[test]
    fn emergency_stop_recovers_to_error_below_max() {
        let (mut core, bus) = make_running_core();
        core.handle_temperature(88.0, &bus);
        core.handle_temperature(70.0, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Error);
        assert!(!core.ctx.outputs.fan_on);
    }

    #[test]
    fn error_recovers_through_initializing() {
        let (mut core, bus) = make_running_core();
        core.handle_temperature(88.0, &bus);
        core.handle_temperature(70.0, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Error);

        // level ok, temp below max, ignition still on → recovery
        core.tick(Instant::now(), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Initializing);
        assert!(core.ctx.outputs.pump_on);
    }

    #[test]
    fn low_coolant_debounce_rides_out_short_dips() {
        let (mut core, bus) = make_running_core();
        let now = Instant::now();

        core.handle_level(false);
        core.tick(now + Duration::from_millis(100), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Running);

        core.handle_level(true);
        core.tick(now + Duration::from_millis(200), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Running);
        assert!(core.ctx.low_level_since.is_none());
    }

    #[test]
    fn sustained_low_coolant_errors_out() {
        let (mut core, bus) = make_running_core();

        core.handle_level(false);
        core.ctx.low_level_since = Some(Instant::now() - Duration::from_secs(4));
        core.tick(Instant::now(), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Error);
        assert!(!core.ctx.outputs.pump_on);
    }

    #[test]
    fn sustained_over_temp_errors_out() {
        let (mut core, bus) = make_running_core();

        core.handle_temperature(78.0, &bus);
        core.tick(Instant::now(), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Running);

        core.ctx.over_temp_since = Some(Instant::now() - Duration::from_secs(11));
        core.tick(Instant::now(), &bus, false);
        assert_eq!(core.fsm.current_state(), SystemState::Error);
    }

    #[test]
    fn ignition_off_shuts_down_from_running() {
        let (mut core, bus) = make_running_core();
        core.handle_ignition(false, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Off);
        assert!(!core.ctx.outputs.pump_on);
        assert!(!core.ctx.outputs.fan_on);
    }

    #[test]
    fn duplicate_sensor_values_are_edge_filtered() {
        let (mut core, bus) = make_core();
        core.handle_ignition(true, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Initializing);
        // Repeating "on" must not re-post IgnitionOn
        core.handle_ignition(true, &bus);
        assert_eq!(core.fsm.current_state(), SystemState::Initializing);
    }

    #[test]
    fn setpoint_changes_apply_to_pid() {
        let mut system = CoolingSystem::new(SystemConfig::default());
        system.set_setpoint(70.0);
        {
            let core = system.core.lock().unwrap();
            assert!((core.pid.setpoint() - 70.0).abs() < 1e-12);
            assert!((core.ctx.config.temp_target - 70.0).abs() < 1e-12);
        }
        system.stop();
    }
}

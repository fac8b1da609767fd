//! Cooling system states, events, and the transition table builder.
//!
//! ```text
//!  OFF ──[IgnitionOn, level ok]──▶ INITIALIZING ──[InitComplete]──▶ RUNNING
//!   ▲                                   ▲                             │
//!   │                          [ErrorCleared,                        │
//!   │                           ignition]        ┌───[LowCoolant]────┤
//!   │                                   │        │    [OverTemp]     │
//!   └────────[IgnitionOff]──────────────│──── ERROR ◀────────────────┤
//!                                       └──────── ▲                  │
//!                                        [TempNormal]          [CriticalTemp]
//!                                                 │                  ▼
//!                                          EMERGENCY_STOP ◀──────────┘
//! ```
//!
//! Emergency stop recovers in two steps: `TempNormal` drops it back to
//! ERROR, and ERROR re-evaluates the full recovery condition before
//! re-initializing. There is no direct path back to RUNNING.

use std::time::Instant;

use log::{info, warn};

use super::context::{ActuatorOutputs, ControlContext};
use super::StateMachine;

// ═══════════════════════════════════════════════════════════════
//  State and event identity
// ═══════════════════════════════════════════════════════════════

/// Supervisory system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemState {
    Off,
    Initializing,
    Running,
    Error,
    EmergencyStop,
}

/// Events processed by the supervisory state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    IgnitionOn,
    IgnitionOff,
    InitComplete,
    LowCoolant,
    OverTemp,
    CriticalTemp,
    ErrorCleared,
    TempNormal,
}

/// The cooling supervisor's state machine type.
pub type CoolingFsm = StateMachine<SystemState, SystemEvent, ControlContext>;

// ═══════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════

/// Build the supervisory state machine, resting in [`SystemState::Off`].
pub fn build_state_machine() -> CoolingFsm {
    let mut sm = StateMachine::new(SystemState::Off);

    sm.add_state(SystemState::Off, Some(off_enter), None);
    sm.add_state(
        SystemState::Initializing,
        Some(initializing_enter),
        Some(initializing_exit),
    );
    sm.add_state(SystemState::Running, Some(running_enter), Some(running_exit));
    sm.add_state(SystemState::Error, Some(error_enter), None);
    sm.add_state(SystemState::EmergencyStop, Some(emergency_enter), None);

    sm.add_transition(
        SystemState::Off,
        SystemEvent::IgnitionOn,
        SystemState::Initializing,
        Some(level_ok_guard),
        None,
    );
    sm.add_transition(
        SystemState::Initializing,
        SystemEvent::InitComplete,
        SystemState::Running,
        None,
        None,
    );
    sm.add_transition(
        SystemState::Running,
        SystemEvent::IgnitionOff,
        SystemState::Off,
        None,
        None,
    );
    sm.add_transition(
        SystemState::Running,
        SystemEvent::LowCoolant,
        SystemState::Error,
        None,
        None,
    );
    sm.add_transition(
        SystemState::Running,
        SystemEvent::OverTemp,
        SystemState::Error,
        None,
        None,
    );
    sm.add_transition(
        SystemState::Running,
        SystemEvent::CriticalTemp,
        SystemState::EmergencyStop,
        None,
        None,
    );
    sm.add_transition(
        SystemState::Error,
        SystemEvent::ErrorCleared,
        SystemState::Initializing,
        Some(ignition_guard),
        None,
    );
    sm.add_transition(
        SystemState::EmergencyStop,
        SystemEvent::TempNormal,
        SystemState::Error,
        None,
        None,
    );

    sm
}

// ═══════════════════════════════════════════════════════════════
//  Guards
// ═══════════════════════════════════════════════════════════════

fn level_ok_guard(ctx: &ControlContext, _event: SystemEvent) -> bool {
    ctx.level_ok
}

fn ignition_guard(ctx: &ControlContext, _event: SystemEvent) -> bool {
    ctx.ignition
}

// ═══════════════════════════════════════════════════════════════
//  Entry / exit hooks
// ═══════════════════════════════════════════════════════════════

fn off_enter(ctx: &mut ControlContext) {
    ctx.outputs = ActuatorOutputs::all_off();
    info!("OFF: outputs cleared");
}

fn initializing_enter(ctx: &mut ControlContext) {
    // Start circulation; RUNNING is reached once the coolant has had
    // `pump_init_secs` to move (checked by the periodic tick).
    ctx.outputs.pump_on = true;
    ctx.pump_start = Some(Instant::now());
    info!(
        "INITIALIZING: pump on, waiting {:.1}s for circulation",
        ctx.config.pump_init_secs
    );
}

fn initializing_exit(ctx: &mut ControlContext) {
    ctx.pump_start = None;
}

fn running_enter(ctx: &mut ControlContext) {
    info!("RUNNING: coolant at {:.1}°C", ctx.current_temp);
}

fn running_exit(ctx: &mut ControlContext) {
    ctx.clear_safety_timers();
}

fn error_enter(ctx: &mut ControlContext) {
    ctx.outputs = ActuatorOutputs::all_off();
    warn!("ERROR: outputs disabled pending recovery");
}

fn emergency_enter(ctx: &mut ControlContext) {
    // Pump off, fan flat out: shed heat from the loop even though
    // circulation has stopped.
    ctx.outputs.pump_on = false;
    ctx.outputs.fan_on = true;
    ctx.outputs.fan_speed = 100;
    warn!(
        "EMERGENCY_STOP: {:.1}°C exceeds critical limit, fan at 100%",
        ctx.current_temp
    );
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::config::SystemConfig;
    use proptest::prelude::*;

    fn arb_event() -> impl Strategy<Value = SystemEvent> {
        prop_oneof![
            Just(SystemEvent::IgnitionOn),
            Just(SystemEvent::IgnitionOff),
            Just(SystemEvent::InitComplete),
            Just(SystemEvent::LowCoolant),
            Just(SystemEvent::OverTemp),
            Just(SystemEvent::CriticalTemp),
            Just(SystemEvent::ErrorCleared),
            Just(SystemEvent::TempNormal),
        ]
    }

    proptest! {
        /// After any event sequence the per-state output invariants hold:
        /// OFF/ERROR all off, EMERGENCY_STOP pump off + fan 100.
        #[test]
        fn output_invariants_hold_for_any_event_sequence(
            inputs in proptest::collection::vec((arb_event(), any::<bool>(), any::<bool>()), 1..100),
        ) {
            let mut sm = build_state_machine();
            let mut ctx = ControlContext::new(SystemConfig::default());
            sm.start(&mut ctx);

            for (event, level_ok, ignition) in inputs {
                ctx.level_ok = level_ok;
                ctx.ignition = ignition;
                sm.process_event(event, &mut ctx);

                match sm.current_state() {
                    SystemState::Off | SystemState::Error => {
                        prop_assert!(!ctx.outputs.pump_on);
                        prop_assert!(!ctx.outputs.fan_on);
                        prop_assert_eq!(ctx.outputs.fan_speed, 0);
                    }
                    SystemState::EmergencyStop => {
                        prop_assert!(!ctx.outputs.pump_on);
                        prop_assert!(ctx.outputs.fan_on);
                        prop_assert_eq!(ctx.outputs.fan_speed, 100);
                    }
                    SystemState::Initializing => {
                        prop_assert!(ctx.outputs.pump_on);
                        prop_assert!(ctx.pump_start.is_some());
                    }
                    SystemState::Running => {}
                }

                // pump_start is only meaningful while initializing
                if sm.current_state() != SystemState::Initializing {
                    prop_assert!(ctx.pump_start.is_none());
                }
            }
        }
    }
}

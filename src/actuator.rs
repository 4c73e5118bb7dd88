//! External actuator interface (§6, downstream): PWM driving itself is out
//! of scope, this only defines the command surface the Pattern Scheduler
//! drives.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

pub trait Actuator {
    /// Commands the actuator to the given state, direction, and
    /// intensity. Implementations (PWM driving, H-bridge control, ...)
    /// live entirely outside this crate.
    fn command(&mut self, state: ActuatorState, direction: Direction, intensity_pct: u8);
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::{Actuator, ActuatorState, Direction};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Command {
        pub state: ActuatorState,
        pub direction: Direction,
        pub intensity_pct: u8,
    }

    #[derive(Default)]
    pub struct MockActuator {
        pub history: heapless::Vec<Command, 64>,
    }

    impl Actuator for MockActuator {
        fn command(&mut self, state: ActuatorState, direction: Direction, intensity_pct: u8) {
            let _ = self.history.push(Command {
                state,
                direction,
                intensity_pct,
            });
        }
    }
}

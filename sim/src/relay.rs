//! Relay-side state and intent handling, free of any I/O.
//!
//! Mirrors what the hardware relay does for each client intent: forward a
//! controller command (reported back as `command_sent`), update its view of
//! the device and broadcast the new snapshot, and manage a small in-memory
//! program store with at most one program running.

use std::collections::BTreeMap;

use exfoliator_common::{
    Axis, CommandStatus, InboundMessage, MacroVariables, MotorState, OutboundMessage,
    PneumaticAction, StagePosition, TapeState, Temperature, VacuumAction,
};
use tracing::{info, warn};

/// What the server should do after an intent was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// Send to the client that sent the intent.
    Reply(InboundMessage),
    /// Send to every connected client.
    Broadcast(InboundMessage),
    /// A program run started; report its outcome later via
    /// [`RelayState::finish_program`].
    ProgramStarted { run: u64 },
    /// A stop was requested for a running program. The run ends at its next
    /// line boundary, again via [`RelayState::finish_program`].
    StopRequested { run: u64 },
}

#[derive(Debug, Clone)]
struct Run {
    id: u64,
    name: String,
    stop_requested: bool,
}

#[derive(Debug, Clone)]
pub struct RelayState {
    /// Whether the relay can reach the controller. When false, commands are
    /// reported `not_connected` and nothing changes.
    pub controller_connected: bool,
    /// When false the relay forwards toggles but never reports the new
    /// actuator state, so client confirmations time out.
    pub respond_to_toggles: bool,
    pub temperature: Temperature,
    pub position: StagePosition,
    pub motor_states: BTreeMap<Axis, MotorState>,
    pub pneumatics: BTreeMap<String, bool>,
    pub vacuums: BTreeMap<String, bool>,
    pub tape: TapeState,
    pub estop: bool,
    pub variables: MacroVariables,
    programs: BTreeMap<String, String>,
    running: Option<Run>,
    next_run: u64,
}

impl Default for RelayState {
    fn default() -> Self {
        let motor_states = Axis::ALL
            .iter()
            .map(|axis| (*axis, MotorState::Disabled))
            .collect();
        let pneumatics = ["nozzle", "stage", "stamp"]
            .iter()
            .map(|name| (name.to_string(), false))
            .collect();
        let vacuums = ["vacnozzle", "chuck"]
            .iter()
            .map(|name| (name.to_string(), false))
            .collect();

        Self {
            controller_connected: true,
            respond_to_toggles: true,
            temperature: Temperature {
                current: 22.0,
                target: 0.0,
            },
            position: StagePosition { x: 0.0, y: 0.0 },
            motor_states,
            pneumatics,
            vacuums,
            tape: TapeState { speed: 0, torque: 0 },
            estop: false,
            variables: MacroVariables::default(),
            programs: BTreeMap::new(),
            running: None,
            next_run: 0,
        }
    }
}

impl RelayState {
    pub fn new(respond_to_toggles: bool, controller_connected: bool) -> Self {
        Self {
            respond_to_toggles,
            controller_connected,
            ..Self::default()
        }
    }

    /// Snapshots sent to every client as soon as it connects.
    pub fn initial_snapshots(&self) -> Vec<InboundMessage> {
        vec![
            InboundMessage::ConnectionStatus {
                connected: self.controller_connected,
            },
            InboundMessage::Temperature(self.temperature),
            InboundMessage::Position(self.position),
            InboundMessage::MotorStates(self.motor_states.clone()),
            InboundMessage::Pneumatics(self.pneumatics.clone()),
            InboundMessage::Vacuums(self.vacuums.clone()),
            InboundMessage::Tape(self.tape),
        ]
    }

    pub fn save_program(&mut self, name: &str, content: &str) {
        self.programs.insert(name.to_string(), content.to_string());
    }

    pub fn program_names(&self) -> Vec<String> {
        self.programs.keys().cloned().collect()
    }

    pub fn running_program(&self) -> Option<&str> {
        self.running.as_ref().map(|run| run.name.as_str())
    }

    pub fn handle(&mut self, intent: &OutboundMessage) -> Vec<Reaction> {
        match intent {
            OutboundMessage::GetArduinoStatus {} => {
                vec![Reaction::Reply(InboundMessage::ArduinoConnectionStatus {
                    connected: self.controller_connected,
                })]
            }
            OutboundMessage::GetMacros {} => vec![Reaction::Reply(InboundMessage::MacroList {
                macros: self.program_names(),
            })],
            OutboundMessage::HomeAxis { axis } => {
                let command = match axis {
                    Some(axis) => format!("Home{}", axis),
                    None => "HomeAll".to_string(),
                };
                self.command(command, |state| {
                    match axis {
                        Some(Axis::X) => state.position.x = 0.0,
                        Some(Axis::Y) => state.position.y = 0.0,
                        None => state.position = StagePosition { x: 0.0, y: 0.0 },
                    }
                    vec![InboundMessage::Position(state.position)]
                })
            }
            OutboundMessage::EnableAxis { axis } => self.toggle(format!("Enable{}", axis), |state| {
                state.motor_states.insert(*axis, MotorState::Ready);
                InboundMessage::MotorStates(state.motor_states.clone())
            }),
            OutboundMessage::DisableMotor { axis } => {
                self.toggle(format!("Disable{}", axis), |state| {
                    state.motor_states.insert(*axis, MotorState::Disabled);
                    InboundMessage::MotorStates(state.motor_states.clone())
                })
            }
            OutboundMessage::MovePosition { axis, position } => {
                self.command(format!("Move{} {}", axis, position), |state| {
                    match axis {
                        Axis::X => state.position.x = *position,
                        Axis::Y => state.position.y = *position,
                    }
                    vec![InboundMessage::Position(state.position)]
                })
            }
            OutboundMessage::PneumaticControl { component, action } => {
                let extended = *action == PneumaticAction::Extend;
                let verb = if extended { "Extend" } else { "Retract" };
                self.toggle(format!("{} {}", verb, component), |state| {
                    state.pneumatics.insert(component.clone(), extended);
                    InboundMessage::Pneumatics(state.pneumatics.clone())
                })
            }
            OutboundMessage::VacuumControl { component, action } => {
                let on = *action == VacuumAction::On;
                let verb = if on { "VacuumOn" } else { "VacuumOff" };
                self.toggle(format!("{} {}", verb, component), |state| {
                    state.vacuums.insert(component.clone(), on);
                    InboundMessage::Vacuums(state.vacuums.clone())
                })
            }
            OutboundMessage::SetTemperature { temperature } => {
                self.command(format!("SetTemp {}", temperature), |state| {
                    state.temperature.target = *temperature;
                    vec![InboundMessage::Temperature(state.temperature)]
                })
            }
            OutboundMessage::TapeMotor {
                speed,
                torque,
                time,
            } => self.command(format!("Tape {} {} {}", speed, torque, time), |state| {
                state.tape = TapeState {
                    speed: *speed,
                    torque: *torque,
                };
                vec![InboundMessage::Tape(state.tape)]
            }),
            OutboundMessage::EmergencyStop {} => self.emergency_stop(),
            OutboundMessage::SendCommand { command } => self.free_form(command),
            OutboundMessage::SaveMacro {
                name,
                content,
                variables,
            } => {
                let name = name.trim();
                if name.is_empty() {
                    return error("Macro name is required");
                }
                self.merge_variables(variables);
                self.save_program(name, content);
                info!(program = name, "program saved");
                vec![Reaction::Reply(InboundMessage::MacroCreated { name: name.into() })]
            }
            OutboundMessage::LoadMacro { name } => match self.programs.get(name.trim()) {
                Some(content) => vec![Reaction::Reply(InboundMessage::MacroContent {
                    name: name.trim().into(),
                    content: content.clone(),
                })],
                None => error(&format!("Failed to load macro {}", name)),
            },
            OutboundMessage::DeleteMacro { name } => match self.programs.remove(name.trim()) {
                Some(_) => vec![Reaction::Reply(InboundMessage::MacroDeleted {
                    name: name.trim().into(),
                })],
                None => error(&format!("Failed to delete macro {}", name)),
            },
            OutboundMessage::RunMacro { name, variables } => self.run_program(name.trim(), variables),
            // The run keeps the program slot until its next line boundary,
            // then reports `macro_error`.
            OutboundMessage::StopMacro {} => match self.running.as_mut() {
                Some(run) => {
                    info!(program = %run.name, "stop requested");
                    let mut reactions =
                        vec![Reaction::Reply(InboundMessage::MacroStopped { success: true })];
                    if !run.stop_requested {
                        run.stop_requested = true;
                        reactions.push(Reaction::StopRequested { run: run.id });
                    }
                    reactions
                }
                None => error("No macro is currently running"),
            },
        }
    }

    /// Ends a program run. Returns the outcome event, or `None` if the run
    /// already ended or was halted by an emergency stop.
    pub fn finish_program(&mut self, run: u64) -> Option<InboundMessage> {
        match &self.running {
            Some(current) if current.id == run => {}
            _ => return None,
        }
        let Run {
            name,
            stop_requested,
            ..
        } = self.running.take()?;
        if stop_requested {
            info!(program = %name, "program stopped");
            return Some(InboundMessage::MacroError {
                error: format!("Macro {} stopped", name),
            });
        }
        let failed = self
            .programs
            .get(&name)
            .is_some_and(|content| content.lines().any(|l| l.trim().eq_ignore_ascii_case("FAIL")));
        if failed {
            warn!(program = %name, "program failed");
            Some(InboundMessage::MacroError {
                error: format!("Macro {} failed", name),
            })
        } else {
            info!(program = %name, "program completed");
            Some(InboundMessage::MacroCompleted { name })
        }
    }

    fn run_program(&mut self, name: &str, variables: &MacroVariables) -> Vec<Reaction> {
        if name.is_empty() {
            return error("Macro name is required");
        }
        if !self.controller_connected {
            return error("Arduino not connected");
        }
        if self.running.is_some() {
            return error("Another macro is already running");
        }
        if !self.programs.contains_key(name) {
            return error(&format!("Macro {} not found", name));
        }
        self.merge_variables(variables);
        self.next_run += 1;
        self.running = Some(Run {
            id: self.next_run,
            name: name.to_string(),
            stop_requested: false,
        });
        info!(program = name, variables = ?self.variables, "program started");
        vec![
            Reaction::Reply(InboundMessage::MacroExecuted { name: name.into() }),
            Reaction::ProgramStarted { run: self.next_run },
        ]
    }

    fn emergency_stop(&mut self) -> Vec<Reaction> {
        warn!("emergency stop");
        self.running = None;
        let mut reactions = vec![Reaction::Broadcast(InboundMessage::CommandSent {
            command: "STOP - EMERGENCY STOP".into(),
            status: Some(self.status()),
        })];
        if self.controller_connected {
            self.estop = true;
            for state in self.motor_states.values_mut() {
                *state = MotorState::Disabled;
            }
            reactions.push(Reaction::Broadcast(InboundMessage::EmergencyStop { triggered: true }));
            reactions.push(Reaction::Broadcast(InboundMessage::MotorStates(
                self.motor_states.clone(),
            )));
        }
        reactions
    }

    fn free_form(&mut self, command: &str) -> Vec<Reaction> {
        let command = command.trim();
        if command.is_empty() {
            return Vec::new();
        }
        let mut reactions = vec![Reaction::Reply(InboundMessage::CommandSent {
            command: command.into(),
            status: Some(self.status()),
        })];
        if !self.controller_connected {
            return reactions;
        }
        if command.eq_ignore_ascii_case("RESET") && self.estop {
            self.estop = false;
            reactions.push(Reaction::Broadcast(InboundMessage::EmergencyStop { triggered: false }));
        }
        reactions.push(Reaction::Reply(InboundMessage::MachineResponse {
            response: format!("OK {}", command),
        }));
        reactions
    }

    /// Forwards a controller command and, when the controller is reachable,
    /// applies `update` and broadcasts the snapshots it returns.
    fn command<F>(&mut self, command: String, update: F) -> Vec<Reaction>
    where
        F: FnOnce(&mut Self) -> Vec<InboundMessage>,
    {
        let mut reactions = vec![Reaction::Reply(InboundMessage::CommandSent {
            command,
            status: Some(self.status()),
        })];
        if self.controller_connected {
            reactions.extend(update(self).into_iter().map(Reaction::Broadcast));
        }
        reactions
    }

    fn toggle<F>(&mut self, command: String, update: F) -> Vec<Reaction>
    where
        F: FnOnce(&mut Self) -> InboundMessage,
    {
        let respond = self.respond_to_toggles;
        self.command(command, |state| {
            if respond {
                vec![update(state)]
            } else {
                Vec::new()
            }
        })
    }

    fn merge_variables(&mut self, variables: &MacroVariables) {
        if variables.chip_x.is_some() {
            self.variables.chip_x = variables.chip_x;
        }
        if variables.chip_y.is_some() {
            self.variables.chip_y = variables.chip_y;
        }
        if variables.stage_x.is_some() {
            self.variables.stage_x = variables.stage_x;
        }
    }

    fn status(&self) -> CommandStatus {
        if self.controller_connected {
            CommandStatus::Queued
        } else {
            CommandStatus::NotConnected
        }
    }
}

fn error(message: &str) -> Vec<Reaction> {
    vec![Reaction::Reply(InboundMessage::MacroError {
        error: message.to_string(),
    })]
}

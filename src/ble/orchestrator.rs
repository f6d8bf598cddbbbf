//! Radio orchestration task.
//!
//! [`RadioOrchestrator`] is the single consumer of the command queue and
//! the only caller of the [`BleStack`].  It brings the stack up under a
//! start-up deadline, then loops forever dispatching commands.  Stack
//! events are pumped from inside its own context, so connection and key
//! state need no locking.
//!
//! ```text
//!  Uninitialized ─► Initializing ─► WaitingForStackOn ─► Running
//!                        │                 │
//!                        └──────► Faulted ◄┘
//! ```
//!
//! A fault is terminal: [`run`](RadioOrchestrator::run) returns and no
//! further commands are taken from the queue.

use embassy_futures::yield_now;
use embassy_time::Instant;

use crate::ble::security::{AuthInfo, SecurityKeyInfo};
use crate::ble::stack::{BleStack, InterruptControl};
use crate::ble::{
    AdvertisementState, CharacteristicIndex, Command, ConnectionHandle, ServiceIndex, StackEvent,
};
use crate::channel::{CommandQueue, IndicatorQueue};
use crate::config::{RadioConfig, STARTUP_EVENTS_PER_POLL};
use crate::debug::{DebugLog, DebugRecord};
use crate::error::{Error, Fault, StackError};
use crate::indicator::IndicatorState;
use crate::timer::StartupDeadline;

/// Observable lifecycle state of the radio task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    Uninitialized,
    Initializing,
    WaitingForStackOn,
    Running { connection: Option<ConnectionHandle> },
    Faulted(Fault),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initializing,
    WaitingForStackOn,
    Running,
    Faulted(Fault),
}

pub struct RadioOrchestrator<'a, S: BleStack> {
    stack: S,
    stack_config: S::Config,
    commands: &'a CommandQueue,
    indicator: &'a IndicatorQueue,
    log: DebugLog<'a>,
    deadline: &'a StartupDeadline,
    config: RadioConfig,

    phase: Phase,
    connection: Option<ConnectionHandle>,
    key_info: SecurityKeyInfo,
    auth_info: AuthInfo,
    notifications_enabled: bool,
}

impl<'a, S: BleStack> RadioOrchestrator<'a, S> {
    pub fn new(
        stack: S,
        stack_config: S::Config,
        commands: &'a CommandQueue,
        indicator: &'a IndicatorQueue,
        log: DebugLog<'a>,
        deadline: &'a StartupDeadline,
        config: RadioConfig,
    ) -> Self {
        Self {
            stack,
            stack_config,
            commands,
            indicator,
            log,
            deadline,
            config,
            phase: Phase::Uninitialized,
            connection: None,
            key_info: config.key_info,
            auth_info: config.security,
            notifications_enabled: false,
        }
    }

    pub fn state(&self) -> RadioState {
        match self.phase {
            Phase::Uninitialized => RadioState::Uninitialized,
            Phase::Initializing => RadioState::Initializing,
            Phase::WaitingForStackOn => RadioState::WaitingForStackOn,
            Phase::Running => RadioState::Running {
                connection: self.connection,
            },
            Phase::Faulted(fault) => RadioState::Faulted(fault),
        }
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn key_info(&self) -> &SecurityKeyInfo {
        &self.key_info
    }

    /// Whether the peer has Battery Level notifications enabled.
    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    /// Task body: start the stack, then dispatch commands forever.
    ///
    /// Returns only when start-up fails.
    pub async fn run<I: InterruptControl>(&mut self, irq: &mut I) -> Error {
        if let Err(fault) = self.start(irq).await {
            return fault.into();
        }

        loop {
            let command = self.commands.receive().await;
            self.dispatch(command);
        }
    }

    /// Bring the stack up and wait for it to report "on".
    ///
    /// The wait pumps a bounded batch of stack events per iteration and
    /// yields between iterations, so a stack that never runs dry cannot
    /// hold off the deadline check.  It ends
    /// on whichever comes first: the stack reporting "on", the deadline
    /// task's timeout flag, or the deadline instant itself.
    pub async fn start<I: InterruptControl>(&mut self, irq: &mut I) -> Result<(), Fault> {
        self.deadline.reset();
        self.phase = Phase::Initializing;

        irq.enable_button_interrupt();
        irq.enable_controller_interrupt();

        if let Err(e) = self.stack.init(&self.stack_config) {
            return Err(self.fault(Fault::StackInit(e)));
        }
        if let Err(e) = self.stack.enable() {
            return Err(self.fault(Fault::StackEnable(e)));
        }
        self.stack.enable_low_power_mode();

        self.phase = Phase::WaitingForStackOn;
        let deadline = self.deadline.arm(self.config.startup_timeout);

        loop {
            self.pump_stack_events(STARTUP_EVENTS_PER_POLL);
            if self.stack.is_on() {
                break;
            }
            if self.deadline.expired() || Instant::now() >= deadline {
                return Err(self.fault(Fault::StartupTimeout));
            }
            yield_now().await;
        }

        self.deadline.cancel();
        self.phase = Phase::Running;
        info!("radio running");
        Ok(())
    }

    fn fault(&mut self, fault: Fault) -> Fault {
        let message = match fault {
            Fault::StackInit(_) => "BLE stack initialization failed",
            Fault::StackEnable(_) => "BLE stack enable failed",
            Fault::StartupTimeout => "BLE stack start-up timed out",
        };
        error!("radio fault: {}", fault);
        self.log.record(DebugRecord::error(message, fault.code()));
        self.phase = Phase::Faulted(fault);
        fault
    }

    /// Execute one command to completion.
    pub fn dispatch(&mut self, command: Command) {
        if let Phase::Faulted(_) = self.phase {
            return;
        }

        match command {
            Command::ProcessStackEvents => self.process_stack_events(),
            Command::UpdateBatteryLevel(level) => self.update_battery_level(level),
            Command::HandleButtonPress => {
                self.start_advertisement();
            }
            Command::Unknown(tag) => self.log.error("Unknown command", tag as u32),
        }
    }

    /// Drain every pending stack event through [`handle_event`](Self::handle_event).
    pub fn process_stack_events(&mut self) {
        while let Some(event) = self.stack.poll_event() {
            self.handle_event(event);
        }
    }

    /// Handle at most `budget` pending stack events.
    fn pump_stack_events(&mut self, budget: usize) {
        for _ in 0..budget {
            let Some(event) = self.stack.poll_event() else {
                return;
            };
            self.handle_event(event);
        }
    }

    fn update_battery_level(&mut self, level: u8) {
        let Some(conn) = self.connection else {
            return;
        };

        match self.stack.send_notification(
            conn,
            ServiceIndex::Battery,
            CharacteristicIndex::BatteryLevel,
            &[level],
        ) {
            Ok(()) | Err(StackError::NotificationsDisabled) => {}
            Err(e) => self.log.error("Failed to send notification", e.code()),
        }

        self.request_stack_processing();
    }

    /// Start advertising unless already advertising or out of connections.
    ///
    /// Returns whether advertising was started.
    pub fn start_advertisement(&mut self) -> bool {
        if self.stack.advertisement_state() == AdvertisementState::Advertising
            || self.stack.active_connection_count() >= self.config.max_connections
        {
            return false;
        }

        match self
            .stack
            .start_advertising(self.config.advertising_mode, self.config.peripheral_profile)
        {
            Ok(()) => {
                self.request_stack_processing();
                true
            }
            Err(e) => {
                self.log.error("Failed to start advertising", e.code());
                false
            }
        }
    }

    /// Queue a stack-event pump ahead of everything already waiting.
    fn request_stack_processing(&mut self) {
        if self.commands.try_send_front(Command::ProcessStackEvents).is_err() {
            self.log.error_msg("Command queue full, stack processing not queued");
        }
    }

    fn publish(&self, state: IndicatorState) {
        self.indicator.overwrite(state);
    }

    /// React to one stack event.
    ///
    /// Only called from within [`process_stack_events`](Self::process_stack_events);
    /// never blocks.
    pub fn handle_event(&mut self, event: StackEvent) {
        trace!("stack event: {}", event);

        match event {
            // General
            StackEvent::StackOn => {
                self.log.info("BLE stack on");
                self.start_advertisement();
                if let Err(e) = self.stack.generate_keys(&self.key_info) {
                    self.log.error("Failed to generate security keys", e.code());
                }
            }
            StackEvent::Timeout => self.log.info("Timeout"),
            StackEvent::SetEventMaskComplete => self.log.info("Set event mask complete"),
            StackEvent::SetDeviceAddressComplete => self.log.info("Set device address complete"),
            StackEvent::SetTxPowerComplete => self.log.info("Set TX power complete"),

            // GAP
            StackEvent::AdvertisementStartStop => {
                match self.stack.advertisement_state() {
                    AdvertisementState::Advertising => {
                        self.log.info("Advertising started");
                        self.publish(IndicatorState::Blinking);
                    }
                    AdvertisementState::Stopped => {
                        self.log.info("Advertising stopped");
                        self.publish(IndicatorState::Off);
                    }
                }
            }
            StackEvent::GapDeviceConnected { bd_handle } => {
                self.log.info("Device connected");
                self.key_info.bind_to(bd_handle);
                if let Err(e) = self.stack.set_security_keys(&self.key_info) {
                    self.log.error("Failed to set security keys", e.code());
                }
                self.publish(IndicatorState::SteadyOn);
            }
            StackEvent::GapDeviceDisconnected { reason } => {
                self.log.info_code("Device disconnected, reason", reason as u32);
                self.connection = None;
                self.notifications_enabled = false;
                self.publish(IndicatorState::Off);
            }
            StackEvent::ConnectionUpdateComplete => self.log.info("Connection parameters updated"),
            StackEvent::AuthRequest { bd_handle } => {
                self.log.info("Authentication requested");
                self.auth_info = self.config.security.reply_for(bd_handle);
                if let Err(e) = self.stack.auth_reply(&self.auth_info) {
                    self.log.error("Failed to reply to authentication request", e.code());
                }
            }
            StackEvent::AuthFailed { error } => {
                self.log.info_code("Authentication failed, error", error as u32)
            }
            StackEvent::KeysGenerated(params) => {
                self.log.info("Security keys generated");
                self.key_info.store_generated(params);
                if let Err(e) = self.stack.set_identity_address(&self.config.identity_address) {
                    self.log.error("Failed to set identity address", e.code());
                }
            }
            StackEvent::PairingFeatureExchanged => self.log.info("Pairing features negotiated"),
            StackEvent::AuthComplete => self.log.info("Authentication complete"),
            StackEvent::EncryptionChanged => self.log.info("Encryption changed"),

            // GATT
            StackEvent::GattConnected(handle) => {
                self.log.info("GATT connected");
                self.connection = Some(handle);
            }
            StackEvent::GattDisconnected => {
                self.log.info("GATT disconnected");
                self.connection = None;
            }
            StackEvent::MtuExchangeRequest => self.log.info("MTU exchange requested"),
            StackEvent::ReadRequest { attr_handle } => {
                self.log.info_code("Read request, attribute", attr_handle as u32)
            }

            // Battery Service
            StackEvent::BatteryNotificationsEnabled => {
                self.notifications_enabled = true;
                self.log.info("Battery notifications enabled");
            }
            StackEvent::BatteryNotificationsDisabled => {
                self.notifications_enabled = false;
                self.log.info("Battery notifications disabled");
            }
            StackEvent::BatteryOther => self.log.info("Battery service event"),

            StackEvent::Other(code) => self.log.info_code("Other event", code),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

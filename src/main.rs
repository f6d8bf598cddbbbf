//! ble-battery - BLE Battery Service peripheral for nRF52840
//!
//! Advertises a Battery Service, notifies the connected central of a
//! simulated battery level, and shows the radio state on LED1.  Pressing
//! BTN1 restarts advertising after it times out.
//!
//! Architecture:
//!   - Embassy async runtime with cooperative multitasking
//!   - Nordic SoftDevice S140, driven from a single radio task
//!   - One bounded queue per consumer; interrupts only enqueue
//!
//! Task overview:
//!   radio_task     - owns the SoftDevice, dispatches the command queue
//!   deadline_task  - start-up deadline timer for the radio task
//!   battery_task   - periodic battery level updates
//!   button_task    - BTN1 edge producer
//!   debug_task     - sole writer of the debug UART
//!   indicator_task - sole driver of LED1

#![no_std]
#![no_main]

mod board;
mod softdevice;

use ble_battery::battery::{self, BatteryLevelSource};
use ble_battery::channel::{CommandQueue, DebugQueue, IndicatorQueue};
use ble_battery::config::{
    RadioConfig, BATTERY_LEVEL_MAX, BATTERY_LEVEL_STEP, BATTERY_UPDATE_PERIOD_SECS,
    LED_BLINK_PERIOD_MS,
};
use ble_battery::debug::{self, DebugLog};
use ble_battery::indicator::{self, StatusLed};
use ble_battery::timer::StartupDeadline;
use ble_battery::RadioOrchestrator;
use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive, Pin};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::{bind_interrupts, peripherals, uarte};
use embassy_time::Duration;
use static_cell::StaticCell;

use defmt_rtt as _;
use panic_probe as _;

use crate::board::{BoardInterrupts, DebugUart};
use crate::softdevice::{SoftdeviceConfig, SoftdeviceStack, StackBuffers};

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

// ═══════════════════════════════════════════════════════════════════════════
// Inter-task queues
// ═══════════════════════════════════════════════════════════════════════════

/// Commands for the radio task (interrupts, battery task, radio task).
static COMMANDS: CommandQueue = CommandQueue::new();

/// Debug records for the debug task.
static DEBUG: DebugQueue = DebugQueue::new();

/// Latest indicator state for the indicator task.
static INDICATOR: IndicatorQueue = IndicatorQueue::new();

static DEADLINE: StartupDeadline = StartupDeadline::new();

static STACK_BUFFERS: StaticCell<StackBuffers> = StaticCell::new();

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn radio_task(stack: SoftdeviceStack) {
    let mut radio = RadioOrchestrator::new(
        stack,
        SoftdeviceConfig::default(),
        &COMMANDS,
        &INDICATOR,
        DebugLog::new(&DEBUG),
        &DEADLINE,
        RadioConfig::default(),
    );

    let err = radio.run(&mut BoardInterrupts).await;
    error!("radio task halted: {}", err);

    // Faulted: stay parked, the indicator keeps its last state.
    core::future::pending::<()>().await;
}

#[embassy_executor::task]
async fn deadline_task() {
    DEADLINE.run().await
}

#[embassy_executor::task]
async fn battery_task() {
    let mut source = BatteryLevelSource::new(BATTERY_LEVEL_STEP, BATTERY_LEVEL_MAX);
    battery::battery_task(
        &COMMANDS,
        DebugLog::new(&DEBUG),
        &mut source,
        Duration::from_secs(BATTERY_UPDATE_PERIOD_SECS),
    )
    .await
}

#[embassy_executor::task]
async fn button_task(pin: AnyPin) {
    board::button_task(pin).await
}

#[embassy_executor::task]
async fn debug_task(mut out: DebugUart) {
    debug::debug_task(&DEBUG, &mut out).await
}

#[embassy_executor::task]
async fn indicator_task(mut led: StatusLed<Output<'static>>) {
    indicator::indicator_task(&INDICATOR, &mut led, Duration::from_millis(LED_BLINK_PERIOD_MS)).await
}

// ═══════════════════════════════════════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("ble-battery starting");

    // Priorities 0, 1 and 4 belong to the SoftDevice.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    interrupt::UARTE0_UART0.set_priority(Priority::P3);
    let uart = uarte::UarteTx::new(p.UARTE0, Irqs, p.P0_06, board::debug_uart_config());
    let led = StatusLed::new(Output::new(p.P0_13, Level::High, OutputDrive::Standard), true);
    let stack = SoftdeviceStack::new(STACK_BUFFERS.init(StackBuffers::new()));

    spawner.must_spawn(debug_task(DebugUart::new(uart)));
    spawner.must_spawn(indicator_task(led));
    spawner.must_spawn(deadline_task());
    spawner.must_spawn(button_task(p.P0_11.degrade()));
    spawner.must_spawn(battery_task());
    spawner.must_spawn(radio_task(stack));
}

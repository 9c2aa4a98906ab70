// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `purelink` - A Rust library to control Dyson connected devices locally.
//!
//! Dyson Pure Cool Link fans, Pure Hot+Cool Link heaters and the 360 Eye
//! robot vacuum each run a small MQTT broker on the local network. This
//! library connects to it directly, keeps a live copy of the device state
//! and sends configuration changes, without going through the cloud.
//!
//! # Supported Features
//!
//! - **Credentials**: Decrypts the local password from the account manifest
//! - **Discovery**: Locates devices by serial over multicast DNS
//! - **Fan control**: Mode, speed, oscillation, night mode, sleep timer,
//!   air quality target, standby monitoring, filter reset
//! - **Heating**: Heat mode, target temperature, focused airflow
//! - **360 Eye**: Start, pause, resume, abort, power mode, map reassembly
//! - **Events**: Listeners and a broadcast stream for every state change
//! - **Resilience**: Automatic reconnection with exponential backoff
//!
//! # Supported Devices
//!
//! - Pure Cool Link tower (475) and desk (469)
//! - Pure Hot+Cool Link (455)
//! - 360 Eye (N223)
//!
//! # Quick Start
//!
//! The account records come from the Dyson cloud account, which this crate
//! does not talk to; [`account::parse_manifest`] reads the device list it
//! returns.
//!
//! ```no_run
//! use purelink::{Configuration, MqttDevice};
//! use purelink::account::parse_manifest;
//! use purelink::types::{FanMode, FanSpeed, SleepTimer};
//!
//! #[tokio::main]
//! async fn main() -> purelink::Result<()> {
//!     let manifest = std::fs::read_to_string("devices.json").expect("manifest");
//!     let records = parse_manifest(&manifest)?;
//!
//!     let device = MqttDevice::from_record(&records[0])?;
//!
//!     // Locates the device on the network, or pass Some("192.168.1.42")
//!     device.connect(None).await?;
//!
//!     device.send_configuration(
//!         &Configuration::new()
//!             .with_fan_mode(FanMode::Fan)
//!             .with_speed(FanSpeed::level(6)?)
//!             .with_sleep_timer(SleepTimer::minutes(30)?),
//!     )?;
//!
//!     if let Some(state) = device.state() {
//!         println!("{state:?}");
//!     }
//!
//!     device.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Event Subscriptions
//!
//! ```no_run
//! use purelink::{MqttDevice, subscription::Subscribable};
//!
//! # async fn example(device: MqttDevice) -> purelink::Result<()> {
//! device.on_state_changed(|old, new| {
//!     println!("{old:?} -> {new:?}");
//! });
//!
//! device.on_environment_changed(|env| {
//!     println!("humidity: {:?}%", env.humidity());
//! });
//!
//! device.on_connection_changed(|event| {
//!     println!("link: {event:?}");
//! });
//!
//! device.connect(None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## 360 Eye
//!
//! ```no_run
//! use purelink::{MqttDevice, subscription::Subscribable};
//! use purelink::types::PowerMode;
//!
//! # async fn example(robot: MqttDevice) -> purelink::Result<()> {
//! robot.on_map_assembled(|map| {
//!     println!("map {} with {} tiles", map.clean_id, map.tiles.len());
//! });
//!
//! robot.connect(None).await?;
//! robot.set_power_mode(PowerMode::Max)?;
//! robot.start()?;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod command;
pub mod config;
pub mod credential;
mod device;
pub mod discovery;
pub mod error;
pub mod event;
pub mod map;
pub mod protocol;
pub mod state;
pub mod subscription;
pub mod telemetry;
pub mod types;

pub use account::AccountDeviceRecord;
pub use command::{Configuration, VacuumCommand};
pub use config::{DeviceConfig, ReconnectionPolicy};
pub use credential::ResolvedCredential;
#[cfg(feature = "mqtt")]
pub use device::MqttDevice;
pub use device::{Device, DeviceBuilder};
pub use discovery::{DeviceLocator, NetworkLocation};
pub use error::{
    CommandError, CredentialError, DeviceError, DiscoveryError, Error, ParseError, ProtocolError,
    Result, ValueError,
};
pub use event::{DeviceEvent, EventBus};
pub use protocol::SessionState;
pub use state::{DeviceState, EnvironmentalState};
pub use subscription::{CallbackRegistry, Subscribable, SubscriptionId};
pub use types::ProductType;

//! Types for the multi-sensor fuel fusion engine.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A fusable telemetry channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    FuelLevel,
    EcuFuelUsed,
    EcuFuelRate,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 3] = [
        SensorChannel::FuelLevel,
        SensorChannel::EcuFuelUsed,
        SensorChannel::EcuFuelRate,
    ];
}

impl std::fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SensorChannel::FuelLevel => "fuel_level",
            SensorChannel::EcuFuelUsed => "ecu_fuel_used",
            SensorChannel::EcuFuelRate => "ecu_fuel_rate",
        };
        write!(f, "{s}")
    }
}

/// Per-channel tuning: how much to trust it, how fast it may legitimately
/// change, and how much history to retain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorConfig {
    pub base_weight: f64,
    pub noise_std: f64,
    /// Maximum plausible rate of change, channel units per minute.
    pub max_rate_of_change: f64,
    pub history_window: usize,
    pub enabled: bool,
}

impl SensorConfig {
    pub fn defaults_for(channel: SensorChannel) -> Self {
        match channel {
            SensorChannel::FuelLevel => Self {
                base_weight: 0.4,
                noise_std: 3.0,
                max_rate_of_change: 2.0,
                history_window: 20,
                enabled: true,
            },
            SensorChannel::EcuFuelUsed => Self {
                base_weight: 0.8,
                noise_std: 0.1,
                max_rate_of_change: 5.0,
                history_window: 20,
                enabled: true,
            },
            SensorChannel::EcuFuelRate => Self {
                base_weight: 0.3,
                noise_std: 0.5,
                max_rate_of_change: 10.0,
                history_window: 20,
                enabled: true,
            },
        }
    }
}

/// One timestamped sample on a channel's bounded history ring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorSample {
    pub value: f64,
    pub timestamp_unix_s: f64,
    pub is_valid: bool,
}

/// Bounded per-channel reading history plus adaptive fusion weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHistory {
    pub config: SensorConfig,
    pub samples: VecDeque<SensorSample>,
    pub adaptive_weight: f64,
}

impl ChannelHistory {
    pub fn new(channel: SensorChannel) -> Self {
        let config = SensorConfig::defaults_for(channel);
        Self {
            adaptive_weight: config.base_weight,
            config,
            samples: VecDeque::new(),
        }
    }

    pub fn push(&mut self, sample: SensorSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.config.history_window {
            self.samples.pop_front();
        }
    }

    pub fn last(&self) -> Option<&SensorSample> {
        self.samples.back()
    }
}

/// Fused fuel estimate for one reading cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedEstimate {
    pub fuel_pct: f64,
    pub fuel_liters: f64,
    pub consumption_gph: f64,
    /// 0.0-1.0, driven by the fraction of configured channels with data.
    pub confidence: f64,
    pub channel_weights: Vec<(SensorChannel, f64)>,
    pub anomalous_channels: Vec<String>,
}

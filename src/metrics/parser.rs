//! Text sensor parsing.
//!
//! Diagnostic tools print loosely formatted text whose layout varies by
//! hardware generation and sampler configuration. A [`SensorParser`] is a
//! chain of independent [`SensorMatcher`]s run over the same text; each one
//! contributes zero or more readings, and the first reading stored under a
//! given name wins for the rest of the pass.
//!
//! Nothing here returns an error. Text that matches no pattern yields empty
//! readings, and a single match whose number fails to parse is skipped.

use crate::metrics::data::ThermalPressure;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

lazy_static! {
    static ref PRESSURE_LEVEL: Regex = Regex::new(
        r"(?i)(?:current\s+)?pressure\s+level\s*:\s*(\w+)|thermal\s+pressure[^\n]*?:\s*(\w+)"
    )
    .expect("valid pressure regex");
    static ref SUBSYSTEM_POWER: Regex =
        Regex::new(r"(?i)(\w+)\s+Power\s*:\s*([\d.]+)\s*(mW|W)\b").expect("valid power regex");
    static ref COMBINED_POWER: Regex =
        Regex::new(r"(?i)Combined\s+Power[^\n]*?:\s*([\d.]+)\s*(mW|W)\b")
            .expect("valid combined power regex");
    static ref LABELED_POWER: Regex =
        Regex::new(r"(?im)^[ \t]*([\w ]+?)\s+power\s*(?:\([^)\n]*\))?\s*:\s*([\d.]+)\s*(m?W)\b")
            .expect("valid labeled power regex");
    static ref NAMED_TEMPERATURE: Regex = Regex::new(
        r"(?i)([\w ]+(?:die|package|thermal)\s*temperature)\s*:\s*([\d.]+)\s*[°º]?\s*C"
    )
    .expect("valid named temperature regex");
    static ref ANY_TEMPERATURE: Regex =
        Regex::new(r"(?i)(?:temperature|temp)[^\n]*?:\s*([\d.]+)\s*[°º]?\s*C")
            .expect("valid temperature regex");
    static ref FAN_SPEED: Regex =
        Regex::new(r"(?i)Fan\s*(\d*)\s*(?::|speed\s*[:\s]\s*)\s*([\d.]+)\s*rpm")
            .expect("valid fan regex");
    static ref ISTATS_CPU_TEMPERATURE: Regex =
        Regex::new(r"(?im)^\s*(?:CPU\s+)?temp(?:erature)?\s*[:\s]\s*([\d.]+)\s*[°º]?\s*C")
            .expect("valid istats cpu regex");
    static ref ISTATS_LABELED_TEMPERATURE: Regex = Regex::new(
        r"(?i)\b(GPU|Battery|Ambient|Enclosure|PCH|SSD)\s*_?(?:temp(?:erature)?)?\s*[:\s]\s*([\d.]+)\s*[°º]?\s*C"
    )
    .expect("valid istats sensor regex");
    static ref BARE_TEMPERATURE: Regex =
        Regex::new(r"([\d.]+)\s*[°º]?\s*C").expect("valid bare temperature regex");
    static ref BARE_RPM: Regex = Regex::new(r"(?i)(\d+)\s*rpm").expect("valid rpm regex");
    static ref LM_SENSORS_TEMPERATURE: Regex =
        Regex::new(r"(?m)^([A-Za-z][\w \-]*?):\s+\+?(-?[\d.]+)\s*[°º]C")
            .expect("valid lm-sensors temperature regex");
    static ref LM_SENSORS_FAN: Regex =
        Regex::new(r"(?im)^fan(\d*):\s+(\d+)\s*RPM").expect("valid lm-sensors fan regex");
}

/// Typed readings extracted from one or more text sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    /// Sensor name to degrees Celsius
    pub temperatures: BTreeMap<String, f64>,
    /// Fan name to RPM
    pub fan_speeds: BTreeMap<String, u32>,
    /// Subsystem name to Watts
    pub power_estimates: BTreeMap<String, f64>,
    pub thermal_pressure: Option<ThermalPressure>,
}

impl SensorReadings {
    /// Store a temperature unless the name already has one.
    pub fn add_temperature(&mut self, name: impl Into<String>, celsius: f64) {
        self.temperatures.entry(name.into()).or_insert(celsius);
    }

    /// Store a fan speed unless the name already has one.
    pub fn add_fan_speed(&mut self, name: impl Into<String>, rpm: u32) {
        self.fan_speeds.entry(name.into()).or_insert(rpm);
    }

    /// Store a power estimate unless the name already has one.
    pub fn add_power(&mut self, name: impl Into<String>, watts: f64) {
        self.power_estimates.entry(name.into()).or_insert(watts);
    }

    /// Store the thermal pressure level unless one was already found.
    pub fn set_thermal_pressure(&mut self, level: ThermalPressure) {
        self.thermal_pressure.get_or_insert(level);
    }

    /// Fill in readings from a lower-priority source without overwriting.
    pub fn fill_gaps(&mut self, other: SensorReadings) {
        for (name, celsius) in other.temperatures {
            self.add_temperature(name, celsius);
        }
        for (name, rpm) in other.fan_speeds {
            self.add_fan_speed(name, rpm);
        }
        for (name, watts) in other.power_estimates {
            self.add_power(name, watts);
        }
        if let Some(level) = other.thermal_pressure {
            self.set_thermal_pressure(level);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperatures.is_empty()
            && self.fan_speeds.is_empty()
            && self.power_estimates.is_empty()
            && self.thermal_pressure.is_none()
    }
}

/// One independent pattern over diagnostic text.
pub trait SensorMatcher: Send + Sync {
    /// Scan `text` and record any readings found.
    fn scan(&self, text: &str, readings: &mut SensorReadings);
}

/// An ordered chain of matchers for one report format family.
pub struct SensorParser {
    matchers: Vec<Box<dyn SensorMatcher>>,
}

impl SensorParser {
    pub fn new(matchers: Vec<Box<dyn SensorMatcher>>) -> Self {
        Self { matchers }
    }

    /// Parser for `powermetrics` output (thermal, power and SMC samplers).
    pub fn powermetrics() -> Self {
        Self::new(vec![
            Box::new(PressureLevelMatcher),
            Box::new(SubsystemPowerMatcher),
            Box::new(CombinedPowerMatcher),
            Box::new(LabeledPowerMatcher),
            Box::new(NamedTemperatureMatcher),
            Box::new(IndexedTemperatureMatcher),
            Box::new(FanSpeedMatcher),
        ])
    }

    /// Parser for `istats` / `istats extra` output.
    pub fn istats() -> Self {
        Self::new(vec![
            Box::new(CpuTemperatureMatcher),
            Box::new(FanSpeedMatcher),
            Box::new(LabeledTemperatureMatcher),
        ])
    }

    /// Parser for `osx-cpu-temp` output, both the temperature and `-f` forms.
    pub fn osx_cpu_temp() -> Self {
        Self::new(vec![Box::new(BareTemperatureMatcher), Box::new(BareFanMatcher)])
    }

    /// Parser for lm-sensors `sensors` output.
    pub fn lm_sensors() -> Self {
        Self::new(vec![Box::new(LmSensorsMatcher)])
    }

    /// Run every matcher over `text`, first writer wins per name.
    pub fn parse(&self, text: &str) -> SensorReadings {
        let mut readings = SensorReadings::default();
        for matcher in &self.matchers {
            matcher.scan(text, &mut readings);
        }
        readings
    }
}

/// Parse a `powermetrics` report.
pub fn parse_powermetrics(text: &str) -> SensorReadings {
    SensorParser::powermetrics().parse(text)
}

fn number(caps: &Captures<'_>, group: usize) -> Option<f64> {
    caps.get(group)?.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn rpm(caps: &Captures<'_>, group: usize) -> Option<u32> {
    number(caps, group).filter(|v| *v >= 0.0).map(|v| v as u32)
}

/// Watts from a value and its unit suffix.
fn to_watts(value: f64, unit: &str) -> f64 {
    if unit.eq_ignore_ascii_case("mw") {
        value / 1000.0
    } else {
        value
    }
}

fn sensor_key(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("_")
}

fn fan_key(label: Option<&str>) -> String {
    match label.map(str::trim) {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            format!("fan_{}", digits)
        }
        _ => "fan_0".to_string(),
    }
}

/// `Current pressure level: Nominal` or `Thermal pressure ...: Heavy`.
pub struct PressureLevelMatcher;

impl SensorMatcher for PressureLevelMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        let Some(caps) = PRESSURE_LEVEL.captures(text) else {
            return;
        };
        let level = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(level) = level.and_then(|l| l.parse::<ThermalPressure>().ok()) {
            readings.set_thermal_pressure(level);
        }
    }
}

/// `CPU Power: 291 mW`, `GPU Power: 1.2 W`.
pub struct SubsystemPowerMatcher;

impl SensorMatcher for SubsystemPowerMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        for caps in SUBSYSTEM_POWER.captures_iter(text) {
            let (Some(value), Some(unit)) = (number(&caps, 2), caps.get(3)) else {
                continue;
            };
            readings.add_power(caps[1].trim(), to_watts(value, unit.as_str()));
        }
    }
}

/// `Combined Power (CPU + GPU + ANE): 292 mW`.
pub struct CombinedPowerMatcher;

impl SensorMatcher for CombinedPowerMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        let Some(caps) = COMBINED_POWER.captures(text) else {
            return;
        };
        if let (Some(value), Some(unit)) = (number(&caps, 1), caps.get(2)) {
            readings.add_power("Combined", to_watts(value, unit.as_str()));
        }
    }
}

/// Multi-word labels in Watts, e.g. `Intel energy model derived package power: 3.21W`.
pub struct LabeledPowerMatcher;

impl SensorMatcher for LabeledPowerMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        for caps in LABELED_POWER.captures_iter(text) {
            let name = sensor_key(&caps[1]);
            if name.is_empty() || name.eq_ignore_ascii_case("combined") || name.eq_ignore_ascii_case("total") {
                continue;
            }
            if let Some(value) = number(&caps, 2) {
                readings.add_power(name, to_watts(value, &caps[3]));
            }
        }
    }
}

/// `CPU die temperature: 45.50 C`.
pub struct NamedTemperatureMatcher;

impl SensorMatcher for NamedTemperatureMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        for caps in NAMED_TEMPERATURE.captures_iter(text) {
            if let Some(celsius) = number(&caps, 2) {
                readings.add_temperature(sensor_key(&caps[1]), celsius);
            }
        }
    }
}

/// Any other temperature line, keyed `temp_<n>` in order of discovery.
///
/// Lines already claimed by [`NamedTemperatureMatcher`] are skipped so a
/// named sensor is not reported twice.
pub struct IndexedTemperatureMatcher;

impl SensorMatcher for IndexedTemperatureMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        for line in text.lines() {
            if NAMED_TEMPERATURE.is_match(line) {
                continue;
            }
            let Some(caps) = ANY_TEMPERATURE.captures(line) else {
                continue;
            };
            if let Some(celsius) = number(&caps, 1) {
                let key = format!("temp_{}", readings.temperatures.len());
                readings.add_temperature(key, celsius);
            }
        }
    }
}

/// `Fan: 1797 rpm`, `Fan 1: 2345 rpm`, `Fan speed: 1200 RPM`.
pub struct FanSpeedMatcher;

impl SensorMatcher for FanSpeedMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        for caps in FAN_SPEED.captures_iter(text) {
            if let Some(speed) = rpm(&caps, 2) {
                readings.add_fan_speed(fan_key(caps.get(1).map(|m| m.as_str())), speed);
            }
        }
    }
}

/// istats `CPU temp: 48.38°C`; only the first hit counts.
pub struct CpuTemperatureMatcher;

impl SensorMatcher for CpuTemperatureMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        if let Some(celsius) = ISTATS_CPU_TEMPERATURE
            .captures_iter(text)
            .find_map(|caps| number(&caps, 1))
        {
            readings.add_temperature("CPU", celsius);
        }
    }
}

/// istats extra sensors such as `Battery temp: 30.1°C`.
pub struct LabeledTemperatureMatcher;

impl SensorMatcher for LabeledTemperatureMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        for caps in ISTATS_LABELED_TEMPERATURE.captures_iter(text) {
            if let Some(celsius) = number(&caps, 2) {
                readings.add_temperature(caps[1].trim(), celsius);
            }
        }
    }
}

/// osx-cpu-temp prints a bare `61.8°C`.
pub struct BareTemperatureMatcher;

impl SensorMatcher for BareTemperatureMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        if let Some(celsius) = BARE_TEMPERATURE.captures(text).and_then(|caps| number(&caps, 1)) {
            readings.add_temperature("CPU", celsius);
        }
    }
}

/// osx-cpu-temp `-f` prints `Fan 0 - Left side at 1200 RPM (34%)`.
pub struct BareFanMatcher;

impl SensorMatcher for BareFanMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        if let Some(speed) = BARE_RPM.captures(text).and_then(|caps| rpm(&caps, 1)) {
            readings.add_fan_speed("fan_0", speed);
        }
    }
}

/// lm-sensors `Core 0:  +45.0°C  (high = +80.0°C)` and `fan1:  1200 RPM`.
pub struct LmSensorsMatcher;

impl SensorMatcher for LmSensorsMatcher {
    fn scan(&self, text: &str, readings: &mut SensorReadings) {
        for caps in LM_SENSORS_TEMPERATURE.captures_iter(text) {
            if let Some(celsius) = number(&caps, 2) {
                readings.add_temperature(sensor_key(&caps[1]), celsius);
            }
        }
        for caps in LM_SENSORS_FAN.captures_iter(text) {
            if let Some(speed) = rpm(&caps, 2) {
                let label = caps.get(1).map(|m| m.as_str()).filter(|l| !l.is_empty());
                readings.add_fan_speed(fan_key(label.or(Some("0"))), speed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPLE_SILICON: &str = "\
**** Thermal pressure ****

Current pressure level: Nominal

**** CPU usage ****

E-Cluster HW active frequency: 1020 MHz
CPU Power: 291 mW
GPU Power: 12 mW
ANE Power: 0 mW
Combined Power (CPU + GPU + ANE): 303 mW
";

    const INTEL_SMC: &str = "\
**** SMC sensors ****

Fan: 1797.11 rpm
CPU die temperature: 52.31 C
GPU die temperature: 48.00 C
CPU Thermal level: 0
Intel energy model derived package power (CPUs+GT+SA): 3.21W
";

    #[test]
    fn test_apple_silicon_report() {
        let readings = parse_powermetrics(APPLE_SILICON);
        assert_eq!(readings.thermal_pressure, Some(ThermalPressure::Nominal));
        assert!((readings.power_estimates["CPU"] - 0.291).abs() < 1e-9);
        assert!((readings.power_estimates["GPU"] - 0.012).abs() < 1e-9);
        assert_eq!(readings.power_estimates["ANE"], 0.0);
        assert!((readings.power_estimates["Combined"] - 0.303).abs() < 1e-9);
        assert!(readings.temperatures.is_empty());
        assert!(readings.fan_speeds.is_empty());
    }

    #[test]
    fn test_watts_are_not_divided() {
        let readings = parse_powermetrics("CPU Power: 2.5 W\nGPU Power: 1500 mW\n");
        assert_eq!(readings.power_estimates["CPU"], 2.5);
        assert_eq!(readings.power_estimates["GPU"], 1.5);
    }

    #[test]
    fn test_intel_smc_report() {
        let readings = parse_powermetrics(INTEL_SMC);
        assert_eq!(readings.temperatures["CPU_die_temperature"], 52.31);
        assert_eq!(readings.temperatures["GPU_die_temperature"], 48.0);
        assert_eq!(readings.temperatures.len(), 2);
        assert_eq!(readings.fan_speeds["fan_0"], 1797);
        assert_eq!(readings.thermal_pressure, None);
        assert_eq!(readings.power_estimates["Intel_energy_model_derived_package"], 3.21);
    }

    #[test]
    fn test_labeled_power_in_milliwatts() {
        let readings =
            parse_powermetrics("Intel energy model derived package power (CPUs+GT+SA): 3210 mW\n");
        assert!((readings.power_estimates["Intel_energy_model_derived_package"] - 3.21).abs() < 1e-9);
    }

    #[test]
    fn test_unnamed_temperatures_are_indexed() {
        let readings = parse_powermetrics("Battery temp: 31.5 C\nSSD temperature reading: 40 C\n");
        assert_eq!(readings.temperatures["temp_0"], 31.5);
        assert_eq!(readings.temperatures["temp_1"], 40.0);
    }

    #[test]
    fn test_first_match_wins_per_name() {
        let readings = parse_powermetrics("CPU Power: 100 mW\nCPU Power: 900 mW\nFan 1 speed: 1000 rpm\nFan 1 speed: 2000 rpm\n");
        assert!((readings.power_estimates["CPU"] - 0.1).abs() < 1e-9);
        assert_eq!(readings.fan_speeds["fan_1"], 1000);
    }

    #[test]
    fn test_pressure_level_is_validated() {
        assert_eq!(
            parse_powermetrics("Current pressure level: Serious").thermal_pressure,
            Some(ThermalPressure::Serious)
        );
        assert_eq!(
            parse_powermetrics("Current pressure level: heavy").thermal_pressure,
            Some(ThermalPressure::Heavy)
        );
        assert_eq!(parse_powermetrics("Current pressure level: Toasty").thermal_pressure, None);
    }

    #[test]
    fn test_garbage_yields_empty_readings() {
        assert!(parse_powermetrics("").is_empty());
        assert!(parse_powermetrics("powermetrics must be invoked as the superuser\n").is_empty());
        assert!(parse_powermetrics("CPU Power: 1.2.3 mW\n").power_estimates.is_empty());
    }

    #[test]
    fn test_istats_output() {
        let text = "\
--- CPU Stats ---
CPU temp:               48.38°C     ▁▂▃▅▆▇

--- Fan Stats ---
Total fans in system:   2
Fan 0 speed:            2157 RPM    ▁▂▃▅▆▇
Fan 1 speed:            1998 RPM    ▁▂▃▅▆▇

--- Extra Stats ---
GPU temp:               45.0°C
Battery temp:           30.1°C
";
        let readings = SensorParser::istats().parse(text);
        assert_eq!(readings.temperatures["CPU"], 48.38);
        assert_eq!(readings.temperatures["GPU"], 45.0);
        assert_eq!(readings.temperatures["Battery"], 30.1);
        assert_eq!(readings.fan_speeds["fan_0"], 2157);
        assert_eq!(readings.fan_speeds["fan_1"], 1998);
    }

    #[test]
    fn test_istats_cpu_ignores_other_sensors() {
        let readings = SensorParser::istats().parse("GPU temp: 50.0°C\nCPU temp: 47.0°C\n");
        assert_eq!(readings.temperatures["CPU"], 47.0);
        assert_eq!(readings.temperatures["GPU"], 50.0);
    }

    #[test]
    fn test_osx_cpu_temp_output() {
        let parser = SensorParser::osx_cpu_temp();
        assert_eq!(parser.parse("61.8°C\n").temperatures["CPU"], 61.8);
        assert_eq!(parser.parse("61.8 ºC\n").temperatures["CPU"], 61.8);

        let fans = parser.parse("Num fans: 1\nFan 0 - Left side   at 1200 RPM (34%)\n");
        assert_eq!(fans.fan_speeds["fan_0"], 1200);
    }

    #[test]
    fn test_lm_sensors_output() {
        let text = "\
coretemp-isa-0000
Adapter: ISA adapter
Package id 0:  +52.0°C  (high = +80.0°C, crit = +100.0°C)
Core 0:        +45.0°C  (high = +80.0°C, crit = +100.0°C)

thinkpad-isa-0000
fan1:        2650 RPM
";
        let readings = SensorParser::lm_sensors().parse(text);
        assert_eq!(readings.temperatures["Package_id_0"], 52.0);
        assert_eq!(readings.temperatures["Core_0"], 45.0);
        assert_eq!(readings.fan_speeds["fan_1"], 2650);
    }

    #[test]
    fn test_fill_gaps_keeps_primary() {
        let mut primary = SensorReadings::default();
        primary.add_temperature("CPU", 70.0);
        let mut fallback = SensorReadings::default();
        fallback.add_temperature("CPU", 40.0);
        fallback.add_temperature("GPU", 41.0);
        fallback.add_fan_speed("fan_0", 900);

        primary.fill_gaps(fallback);
        assert_eq!(primary.temperatures["CPU"], 70.0);
        assert_eq!(primary.temperatures["GPU"], 41.0);
        assert_eq!(primary.fan_speeds["fan_0"], 900);
    }
}

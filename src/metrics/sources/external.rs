//! Fallback temperature and fan readings from third-party tools.
//!
//! Tools are tried in order and the first one that yields any reading wins.
//! A tool that is not installed, times out or exits non-zero is skipped.

use crate::metrics::command::run_tool;
use crate::metrics::parser::{SensorParser, SensorReadings};
use crate::metrics::result::{CollectorData, CollectorResult};
use crate::metrics::traits::Collector;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// One external tool and the command lines to try for it.
pub struct ExternalTool {
    name: &'static str,
    invocations: Vec<Vec<String>>,
    parser: SensorParser,
    stop_at_first: bool,
}

impl ExternalTool {
    pub fn new(name: &'static str, invocations: Vec<Vec<String>>, parser: SensorParser) -> Self {
        Self {
            name,
            invocations,
            parser,
            stop_at_first: false,
        }
    }

    /// Stop after the first invocation that yields readings.
    pub fn first_hit(mut self) -> Self {
        self.stop_at_first = true;
        self
    }

    /// `istats extra`, falling back to plain `istats`.
    pub fn istats() -> Self {
        Self::new(
            "istats",
            vec![argv(&["istats", "extra"]), argv(&["istats"])],
            SensorParser::istats(),
        )
        .first_hit()
    }

    /// `osx-cpu-temp` for the CPU, `osx-cpu-temp -f` for fans.
    pub fn osx_cpu_temp() -> Self {
        Self::new(
            "osx-cpu-temp",
            vec![argv(&["osx-cpu-temp"]), argv(&["osx-cpu-temp", "-f"])],
            SensorParser::osx_cpu_temp(),
        )
    }

    /// lm-sensors on Linux.
    pub fn lm_sensors() -> Self {
        Self::new("sensors", vec![argv(&["sensors"])], SensorParser::lm_sensors())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    async fn read(&self, timeout: Duration) -> SensorReadings {
        let mut readings = SensorReadings::default();
        for command in &self.invocations {
            let Some((program, args)) = command.split_first() else {
                continue;
            };
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match run_tool(program, &args, timeout).await {
                Ok(output) => readings.fill_gaps(self.parser.parse(&output.combined())),
                Err(err) if err.is_not_found() => {
                    debug!("{}", err);
                    break;
                }
                Err(err) => debug!("{}: {}", self.name, err),
            }
            if self.stop_at_first && !readings.is_empty() {
                break;
            }
        }
        readings
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Runs the fallback tool chain.
pub struct ExternalToolsCollector {
    tools: Vec<ExternalTool>,
    timeout: Duration,
}

impl ExternalToolsCollector {
    pub fn new(tools: Vec<ExternalTool>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    /// istats, then osx-cpu-temp, then lm-sensors.
    pub fn with_default_tools(timeout: Duration) -> Self {
        Self::new(
            vec![ExternalTool::istats(), ExternalTool::osx_cpu_temp(), ExternalTool::lm_sensors()],
            timeout,
        )
    }
}

#[async_trait]
impl Collector for ExternalToolsCollector {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn collect(&mut self) -> CollectorResult {
        let mut readings = SensorReadings::default();
        for tool in &self.tools {
            readings = tool.read(self.timeout).await;
            if !readings.temperatures.is_empty() || !readings.fan_speeds.is_empty() {
                debug!("sensor readings from {}", tool.name());
                break;
            }
        }

        CollectorResult::success(CollectorData {
            temperatures_extra: Some(readings.temperatures),
            fan_speeds_extra: Some(readings.fan_speeds),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(name: &'static str, script: &str, parser: SensorParser) -> ExternalTool {
        ExternalTool::new(name, vec![argv(&["sh", "-c", script])], parser)
    }

    #[tokio::test]
    async fn test_missing_tools_yield_empty_success() {
        let tools = vec![ExternalTool::new(
            "missing",
            vec![argv(&["hostpulse-missing-sensor-tool"])],
            SensorParser::istats(),
        )];
        let mut collector = ExternalToolsCollector::new(tools, Duration::from_secs(1));
        let result = collector.collect().await;
        assert!(result.success);
        assert!(result.data.temperatures_extra.unwrap().is_empty());
        assert!(result.data.fan_speeds_extra.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_first_tool_with_data_wins() {
        let tools = vec![
            shell("empty", "echo 'no sensors found'", SensorParser::istats()),
            shell("first", "echo 'CPU temp: 48.5°C'", SensorParser::istats()),
            shell("second", "echo 'CPU temp: 99.0°C'", SensorParser::istats()),
        ];
        let mut collector = ExternalToolsCollector::new(tools, Duration::from_secs(5));
        let result = collector.collect().await;
        let temperatures = result.data.temperatures_extra.unwrap();
        assert_eq!(temperatures.get("CPU"), Some(&48.5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_is_skipped() {
        let tools = vec![
            shell("broken", "exit 2", SensorParser::lm_sensors()),
            shell("fans", "echo 'fan1:        1450 RPM'", SensorParser::lm_sensors()),
        ];
        let mut collector = ExternalToolsCollector::new(tools, Duration::from_secs(5));
        let result = collector.collect().await;
        assert_eq!(result.data.fan_speeds_extra.unwrap().get("fan_1"), Some(&1450));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invocations_combine_within_a_tool() {
        let tool = ExternalTool::new(
            "osx-cpu-temp",
            vec![
                argv(&["sh", "-c", "echo '61.8°C'"]),
                argv(&["sh", "-c", "echo 'Fan 0 - Left side at 1200 RPM (34%)'"]),
            ],
            SensorParser::osx_cpu_temp(),
        );
        let readings = tool.read(Duration::from_secs(5)).await;
        assert_eq!(readings.temperatures.get("CPU"), Some(&61.8));
        assert_eq!(readings.fan_speeds.get("fan_0"), Some(&1200));
    }
}

use std::{path::Path, str::FromStr};

use anyhow::Result;
use candle::Device;
use ini::{Ini, SectionSetter};

pub const CONFIG_FILE: &str = "spk-pool.ini";
pub const DEFAULT_MODEL: &str = "checkpoints/pooling";
pub const DEFAULT_INPUT: &str = "encoder_output.safetensors";
pub const DEFAULT_OUTPUT: &str = "embeddings.safetensors";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda(usize),
}

impl DeviceKind {
    pub fn device(&self) -> Result<Device> {
        Ok(match *self {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda(ordinal) => Device::new_cuda(ordinal)?,
        })
    }
}

impl FromStr for DeviceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" => Ok(DeviceKind::Cuda(0)),
            s => match s.strip_prefix("cuda:") {
                Some(ordinal) => Ok(DeviceKind::Cuda(ordinal.parse()?)),
                None => anyhow::bail!("unknown device {s:?}"),
            },
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// Settings of the `spk-pool` command, read from an INI file.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Hub repo id or local directory holding `config.json` and `model.safetensors`.
    pub model: String,
    pub device: DeviceKind,
    pub input: String,
    pub output: String,
    pub task_tokens: Vec<u32>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            device: DeviceKind::Cpu,
            input: DEFAULT_INPUT.to_string(),
            output: DEFAULT_OUTPUT.to_string(),
            task_tokens: vec![0],
            verbose: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let conf = Ini::load_from_file(path).unwrap_or_default();
        Self::from_ini(&conf)
    }

    pub fn from_ini(conf: &Ini) -> Self {
        let default = Self::default();
        Self {
            model: conf.get_str("model", &default.model),
            device: conf.get_parsed("device", default.device),
            input: conf.get_str("input", &default.input),
            output: conf.get_str("output", &default.output),
            task_tokens: conf.get_list("task-tokens", &default.task_tokens),
            verbose: conf.get_bool("verbose", default.verbose),
        }
    }

    pub fn to_ini(&self) -> Ini {
        let tokens: Vec<_> = self.task_tokens.iter().map(|t| t.to_string()).collect();

        let mut conf = Ini::new();
        conf.with_general_section()
            .set("model", &self.model)
            .set("device", self.device.to_string())
            .set("input", &self.input)
            .set("output", &self.output)
            .set("task-tokens", tokens.join(","))
            .set_bool("verbose", self.verbose);
        conf
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_ini().write_to_file(path)?;
        Ok(())
    }
}

trait IniSetter<'a> {
    fn set_bool(&'a mut self, key: &str, value: bool) -> &'a mut SectionSetter<'a>;
}

impl<'a> IniSetter<'a> for SectionSetter<'a> {
    fn set_bool(&'a mut self, key: &str, value: bool) -> &'a mut SectionSetter<'a> {
        self.set(key, (value as u32).to_string())
    }
}

trait IniGetter {
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn get_str(&self, key: &str, default: &str) -> String;
    fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> T;
    fn get_list<T: FromStr + Clone>(&self, key: &str, default: &[T]) -> Vec<T>;
}

impl IniGetter for Ini {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.general_section().get(key) {
            Some("0") => false,
            Some(_) => true,
            _ => default,
        }
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        self.general_section()
            .get(key)
            .unwrap_or(default)
            .to_string()
    }

    fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.general_section().get(key).map(T::from_str) {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                tracing::warn!(key, "ignoring unparsable setting");
                default
            }
            None => default,
        }
    }

    fn get_list<T: FromStr + Clone>(&self, key: &str, default: &[T]) -> Vec<T> {
        let Some(value) = self.general_section().get(key) else {
            return default.to_vec();
        };
        let list: Result<Vec<T>, _> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(T::from_str)
            .collect();
        match list {
            Ok(list) if !list.is_empty() => list,
            _ => {
                tracing::warn!(key, "ignoring unparsable list setting");
                default.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_use_defaults() {
        let conf = Ini::load_from_str("model = foo/bar\n").unwrap();
        let config = Config::from_ini(&conf);
        assert_eq!(config.model, "foo/bar");
        assert_eq!(config.device, DeviceKind::Cpu);
        assert_eq!(config.task_tokens, vec![0]);
        assert!(!config.verbose);
    }

    #[test]
    fn test_parse_values() {
        let conf = Ini::load_from_str(
            "device = cuda:1\ntask-tokens = 2, 0,3\nverbose = 1\noutput = out.safetensors\n",
        )
        .unwrap();
        let config = Config::from_ini(&conf);
        assert_eq!(config.device, DeviceKind::Cuda(1));
        assert_eq!(config.task_tokens, vec![2, 0, 3]);
        assert!(config.verbose);
        assert_eq!(config.output, "out.safetensors");
    }

    #[test]
    fn test_bad_values_fall_back() {
        let conf = Ini::load_from_str("device = tpu\ntask-tokens = a,b\n").unwrap();
        let config = Config::from_ini(&conf);
        assert_eq!(config.device, DeviceKind::Cpu);
        assert_eq!(config.task_tokens, vec![0]);
    }

    #[test]
    fn test_ini_round_trip() {
        let config = Config {
            device: DeviceKind::Cuda(0),
            task_tokens: vec![1, 2],
            verbose: true,
            ..Default::default()
        };
        assert_eq!(Config::from_ini(&config.to_ini()), config);
    }
}

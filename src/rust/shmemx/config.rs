// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        policy::SchedulePolicy,
        scheduler::SchedulerOptions,
        types::ThreadLevel,
    },
};
use ::std::{
    env,
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
};
use ::yaml_rust::{
    yaml::Hash,
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "CONFIG_PATH";

// Thread scheduling options. Every option may be overridden by the upper-cased environment variable of the same name.
mod scheduler_config {
    pub const SECTION_NAME: &str = "scheduler";
    // One of fifo, random, auto or none.
    pub const THREAD_SCHEDULE_POLICY: &str = "thread_schedule_policy";
    // Log every queue change.
    pub const THREAD_SCHEDULE_VERBOSE: &str = "thread_schedule_verbose";
    // One of single, funneled, serialized or multiple.
    pub const THREAD_LEVEL: &str = "thread_level";
    // Seed for the random policy.
    pub const RANDOM_SEED: &str = "random_seed";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_str(&config_s)
    }

    /// Loads the file named by `CONFIG_PATH`, or an empty configuration when the variable is unset.
    pub fn from_env() -> Result<Self, Fail> {
        match env::var(CONFIG_PATH_VAR) {
            Ok(config_path) => Self::new(&config_path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Reads every scheduler option.
    pub fn scheduler_options(&self) -> Result<SchedulerOptions, Fail> {
        Ok(SchedulerOptions {
            policy: self.thread_schedule_policy()?,
            verbose: self.thread_schedule_verbose()?,
            thread_level: self.thread_level()?,
            random_seed: self.random_seed()?,
        })
    }

    /// Scheduler config: Reads the scheduling policy. Defaults to [SchedulePolicy::Auto].
    pub fn thread_schedule_policy(&self) -> Result<SchedulePolicy, Fail> {
        if let Some(policy) = Self::get_typed_env_option(scheduler_config::THREAD_SCHEDULE_POLICY)? {
            return Ok(policy);
        }
        match self.get_scheduler_option(scheduler_config::THREAD_SCHEDULE_POLICY) {
            Some(option) => Self::parse_str_option(option, scheduler_config::THREAD_SCHEDULE_POLICY),
            None => Ok(SchedulePolicy::default()),
        }
    }

    /// Scheduler config: Reads whether queue changes are logged. Defaults to false.
    pub fn thread_schedule_verbose(&self) -> Result<bool, Fail> {
        if let Some(verbose) = Self::get_typed_env_option(scheduler_config::THREAD_SCHEDULE_VERBOSE)? {
            return Ok(verbose);
        }
        match self.get_scheduler_option(scheduler_config::THREAD_SCHEDULE_VERBOSE) {
            Some(option) => Self::get_typed_option(option, scheduler_config::THREAD_SCHEDULE_VERBOSE, Yaml::as_bool),
            None => Ok(false),
        }
    }

    /// Scheduler config: Reads the thread level. Defaults to [ThreadLevel::Multiple].
    pub fn thread_level(&self) -> Result<ThreadLevel, Fail> {
        if let Some(level) = Self::get_typed_env_option(scheduler_config::THREAD_LEVEL)? {
            return Ok(level);
        }
        match self.get_scheduler_option(scheduler_config::THREAD_LEVEL) {
            Some(option) => Self::parse_str_option(option, scheduler_config::THREAD_LEVEL),
            None => Ok(ThreadLevel::Multiple),
        }
    }

    /// Scheduler config: Reads the seed of the random policy, if any.
    pub fn random_seed(&self) -> Result<Option<u64>, Fail> {
        if let Some(seed) = Self::get_typed_env_option(scheduler_config::RANDOM_SEED)? {
            return Ok(Some(seed));
        }
        match self.get_scheduler_option(scheduler_config::RANDOM_SEED) {
            Some(option) => {
                let seed: i64 = Self::get_typed_option(option, scheduler_config::RANDOM_SEED, Yaml::as_i64)?;
                match u64::try_from(seed) {
                    Ok(seed) => Ok(Some(seed)),
                    Err(_) => {
                        let message: String = format!("parameter \"{}\" is out of range", scheduler_config::RANDOM_SEED);
                        Err(Fail::new(libc::ERANGE, message.as_str()))
                    },
                }
            },
            None => Ok(None),
        }
    }

    /// Looks up an option of the scheduler section. A missing section or option means "use the default".
    fn get_scheduler_option(&self, index: &str) -> Option<&Yaml> {
        let section: &Yaml = self.0.index(scheduler_config::SECTION_NAME);
        if !matches!(section, Yaml::Hash(_)) {
            return None;
        }
        match section.index(index) {
            Yaml::BadValue | Yaml::Null => None,
            value => Some(value),
        }
    }

    /// Validates `option` with `receiver`.
    fn get_typed_option<'a, T, Fn>(option: &'a Yaml, index: &str, receiver: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        match receiver(option) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter {} has unexpected type", index);
                error!("get_typed_option(): {}", message);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Parses a string option with [FromStr].
    fn parse_str_option<T: FromStr>(option: &Yaml, index: &str) -> Result<T, Fail> {
        if let Some(value) = option.as_str() {
            if let Ok(value) = value.parse() {
                return Ok(value);
            }
        }
        let message: String = format!("parameter {} has unexpected value", index);
        error!("parse_str_option(): {}", message);
        Err(Fail::new(libc::EINVAL, message.as_str()))
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// An empty configuration: every option takes its default.
impl Default for Config {
    fn default() -> Self {
        Self(Yaml::Hash(Hash::new()))
    }
}

impl FromStr for Config {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Vec<Yaml> = YamlLoader::load_from_str(s)?;
        match &config[..] {
            [c] => Ok(Self(c.clone())),
            [] => Ok(Self::default()),
            _ => Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Process configuration (spec §6 "Environment variables"), read the same
//! way `tools/fvm-bench` reads its CLI: `clap::Parser` with `env`
//! fallbacks, since these are long-running service settings rather than
//! one-shot flags.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "cu-server", about = "Compute-unit evaluation pipeline HTTP server")]
pub struct Config {
    /// Socket address the HTTP surface binds to.
    #[arg(long, env = "CU_SERVER_ADDR", default_value = "0.0.0.0:6363")]
    pub addr: std::net::SocketAddr,

    /// Maximum number of compiled modules kept warm in memory.
    #[arg(long, env = "WASM_MODULE_CACHE_MAX_SIZE", default_value_t = 32)]
    pub wasm_module_cache_max_size: usize,

    /// Maximum number of live instances kept warm per execution worker.
    #[arg(long, env = "WASM_INSTANCE_CACHE_MAX_SIZE", default_value_t = 16)]
    pub wasm_instance_cache_max_size: usize,

    /// Directory holding gzip'd Wasm binaries (`<moduleId>.wasm.gz`).
    #[arg(long, env = "WASM_BINARY_FILE_DIRECTORY", default_value = "./data/modules")]
    pub wasm_binary_file_directory: PathBuf,

    /// Base URL of the module/transaction gateway.
    #[arg(long, env = "GATEWAY_URL", default_value = "https://arweave.net")]
    pub gateway_url: String,

    /// Default per-process linear memory ceiling, in 64KiB Wasm pages.
    #[arg(long, env = "PROCESS_WASM_MEMORY_MAX_LIMIT", default_value_t = 4096)]
    pub process_wasm_memory_max_limit: u32,

    /// Default per-process compute (gas/fuel) ceiling.
    #[arg(long, env = "PROCESS_WASM_COMPUTE_MAX_LIMIT", default_value_t = 9_000_000_000)]
    pub process_wasm_compute_max_limit: u64,

    /// Interval, in seconds, between resident-memory monitor samples.
    #[arg(long, env = "MEM_MONITOR_INTERVAL", default_value_t = 30)]
    pub mem_monitor_interval: u64,

    /// Directory heap snapshots are written to on operator signal.
    #[arg(long, env = "DUMP_PATH", default_value = "./data/dumps")]
    pub dump_path: PathBuf,

    /// Bound on the crank's recursive walk over a process's own `Spawns`/
    /// `Messages`, since the distilled spec names the crank without
    /// spelling out a termination condition (see DESIGN.md).
    #[arg(long, env = "CU_MAX_CRANK_DEPTH", default_value_t = 16)]
    pub max_crank_depth: usize,
}

impl Config {
    pub fn memory_limit(&self) -> cu_shared::MemoryPages {
        cu_shared::MemoryPages::new(self.process_wasm_memory_max_limit)
    }

    pub fn compute_limit(&self) -> cu_shared::Gas {
        cu_shared::Gas::new(self.process_wasm_compute_max_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_env_vars() {
        let config = Config::parse_from(["cu-server"]);
        assert_eq!(config.addr.to_string(), "0.0.0.0:6363");
        assert_eq!(config.wasm_module_cache_max_size, 32);
        assert_eq!(config.wasm_instance_cache_max_size, 16);
        assert_eq!(config.wasm_binary_file_directory, PathBuf::from("./data/modules"));
        assert_eq!(config.gateway_url, "https://arweave.net");
        assert_eq!(config.process_wasm_memory_max_limit, 4096);
        assert_eq!(config.process_wasm_compute_max_limit, 9_000_000_000);
        assert_eq!(config.mem_monitor_interval, 30);
        assert_eq!(config.dump_path, PathBuf::from("./data/dumps"));
        assert_eq!(config.max_crank_depth, 16);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_from([
            "cu-server",
            "--addr",
            "127.0.0.1:9000",
            "--process-wasm-memory-max-limit",
            "64",
            "--cu-max-crank-depth",
            "4",
        ]);
        assert_eq!(config.addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.process_wasm_memory_max_limit, 64);
        assert_eq!(config.max_crank_depth, 4);
    }

    #[test]
    fn derived_limits_carry_the_configured_values() {
        let mut config = Config::parse_from(["cu-server"]);
        config.process_wasm_memory_max_limit = 8;
        config.process_wasm_compute_max_limit = 100;
        assert_eq!(config.memory_limit(), cu_shared::MemoryPages::new(8));
        assert_eq!(config.compute_limit(), cu_shared::Gas::new(100));
    }
}

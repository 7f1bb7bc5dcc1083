// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The profile declarations shipped with this build of the controller.

use super::{CatalogError, HealthProbe, Profile, ProfileCatalog, ProfileCategory, ResourceFootprint, ServiceDefinition};

pub(super) fn catalog() -> Result<ProfileCatalog, CatalogError> {
    let services = vec![
        ServiceDefinition::new("kaspa-node", "kaspa-node", "kaspanet/kaspad:v0.12.19")
            .with_container_name("kaspad")
            .with_probe(HealthProbe::JsonRpc {
                port: 16110,
                method: "getInfo".to_string(),
            })
            .critical()
            .with_footprint(ResourceFootprint::new(4.0, 8.0, 100.0, 2.0))
            .with_port("rpc", 16110)
            .with_port("p2p", 16111),
        ServiceDefinition::new("aio-dashboard", "kaspa-node", "kaspaaio/dashboard:0.4.1")
            .with_probe(HealthProbe::Http {
                port: 8080,
                path: "/".to_string(),
            })
            .with_footprint(ResourceFootprint::new(0.5, 0.5, 1.0, 0.25))
            .with_port("http", 8080),
        ServiceDefinition::new("nginx", "kaspa-node", "nginx:1.25-alpine")
            .with_container_name("aio-nginx")
            .with_probe(HealthProbe::Tcp { port: 80 })
            .critical()
            .with_footprint(ResourceFootprint::new(0.1, 0.2, 0.1, 0.1))
            .with_port("http", 80)
            .with_port("https", 443),
        ServiceDefinition::new("timescaledb", "kaspa-explorer-bundle", "timescale/timescaledb:2.11.2-pg15")
            .with_probe(HealthProbe::Tcp { port: 5432 })
            .with_footprint(ResourceFootprint::new(2.0, 4.0, 50.0, 1.0))
            .with_port("postgres", 5432),
        ServiceDefinition::new("simply-kaspa-indexer", "kaspa-explorer-bundle", "supertypo/simply-kaspa-indexer:1.0.1")
            .with_dependencies(&["kaspa-node", "timescaledb"])
            .with_footprint(ResourceFootprint::new(4.0, 6.0, 120.0, 3.0)),
        ServiceDefinition::new("kaspa-explorer", "kaspa-explorer-bundle", "kaspanet/kaspa-explorer:v1.2.0")
            .with_probe(HealthProbe::Http {
                port: 4000,
                path: "/".to_string(),
            })
            .with_dependencies(&["simply-kaspa-indexer"])
            .with_footprint(ResourceFootprint::new(2.0, 2.0, 30.0, 1.0))
            .with_port("http", 4000)
            .with_startup_phase(3),
        ServiceDefinition::new("kaspa-rest-server", "kaspa-rest-api", "kaspanet/kaspa-rest-server:v2.0.5")
            .with_probe(HealthProbe::Http {
                port: 8000,
                path: "/info".to_string(),
            })
            .with_dependencies(&["kaspa-node"])
            .with_footprint(ResourceFootprint::new(1.0, 2.0, 5.0, 1.0))
            .with_port("http", 8000),
        ServiceDefinition::new("kaspa-wallet", "kaspa-wallet", "kaspaaio/wallet:0.4.1")
            .with_probe(HealthProbe::Tcp { port: 8082 })
            .with_dependencies(&["kaspa-node"])
            .with_footprint(ResourceFootprint::new(0.5, 1.0, 2.0, 0.5))
            .with_port("rpc", 8082),
        ServiceDefinition::new("kaspa-stratum", "kaspa-mining", "onemorebsmith/kaspa-stratum-bridge:v1.2.1")
            .with_probe(HealthProbe::Tcp { port: 5555 })
            .with_dependencies(&["kaspa-node"])
            .with_footprint(ResourceFootprint::new(0.25, 0.5, 0.5, 0.5))
            .with_port("stratum", 5555),
    ];

    let profiles = vec![
        Profile::new("kaspa-node", "Kaspa Node", ProfileCategory::Node, 1)
            .with_services(&["kaspa-node", "aio-dashboard", "nginx"])
            .with_shared_services(&["aio-dashboard", "nginx"])
            .with_conflicts(&["kaspa-archive-node"])
            .with_config_keys(&["KASPA_NETWORK", "KASPAD_RPC_PORT", "KASPAD_P2P_PORT", "KASPAD_EXTRA_ARGS"]),
        Profile::new("kaspa-archive-node", "Kaspa Archive Node", ProfileCategory::Node, 1)
            .with_services(&["kaspa-node", "aio-dashboard", "nginx"])
            .with_shared_services(&["aio-dashboard", "nginx"])
            .with_conflicts(&["kaspa-node"])
            .with_config_keys(&["KASPA_NETWORK", "KASPAD_ARCHIVAL", "KASPAD_EXTRA_ARGS"]),
        Profile::new("kaspa-explorer-bundle", "Kaspa Explorer", ProfileCategory::Indexer, 2)
            .with_services(&["timescaledb", "simply-kaspa-indexer", "kaspa-explorer", "aio-dashboard", "nginx"])
            .with_shared_services(&["timescaledb", "aio-dashboard", "nginx"])
            .with_prerequisites(&["kaspa-node", "kaspa-archive-node"])
            .with_config_keys(&["POSTGRES_DB", "POSTGRES_PASSWORD", "INDEXER_BATCH_SIZE", "EXPLORER_PUBLIC_URL"]),
        Profile::new("kaspa-rest-api", "Kaspa REST API", ProfileCategory::Application, 2)
            .with_services(&["kaspa-rest-server", "aio-dashboard", "nginx"])
            .with_shared_services(&["aio-dashboard", "nginx"])
            .with_prerequisites(&["kaspa-node", "kaspa-archive-node"])
            .with_config_keys(&["REST_API_PORT", "REST_API_RATE_LIMIT"]),
        Profile::new("kaspa-wallet", "Kaspa Wallet", ProfileCategory::Application, 2)
            .with_services(&["kaspa-wallet", "aio-dashboard", "nginx"])
            .with_shared_services(&["aio-dashboard", "nginx"])
            .with_prerequisites(&["kaspa-node", "kaspa-archive-node"])
            .with_config_keys(&["WALLET_RPC_PORT", "WALLET_PASSWORD"]),
        Profile::new("kaspa-mining", "Stratum Bridge", ProfileCategory::Mining, 2)
            .with_services(&["kaspa-stratum", "aio-dashboard", "nginx"])
            .with_shared_services(&["aio-dashboard", "nginx"])
            .with_prerequisites(&["kaspa-node", "kaspa-archive-node"])
            .with_config_keys(&["STRATUM_PORT", "MINING_ADDRESS"]),
    ];

    let aliases = vec![
        ("kaspa-fullnode".to_string(), "kaspa-node".to_string()),
        ("explorer".to_string(), "kaspa-explorer-bundle".to_string()),
        ("kaspa-indexer".to_string(), "kaspa-explorer-bundle".to_string()),
        ("rest-api".to_string(), "kaspa-rest-api".to_string()),
        ("mining".to_string(), "kaspa-mining".to_string()),
    ];

    ProfileCatalog::load(profiles, services, aliases)
}

//! System-wide constants and registry defaults.

/// Token endpoint used for anonymous pull tokens.
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";

/// `service` query parameter sent to the token endpoint.
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Base URL of the registry's v2 API.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";

/// Namespace that single-component repository names live in.
pub const OFFICIAL_NAMESPACE: &str = "library";

/// Tag used when a reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Media type requested from the manifest endpoint.
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Suffix appended to a digest's hex part when staging a layer archive.
pub const LAYER_ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Algorithm prefix for SHA-256 digests.
pub const SHA256_PREFIX: &str = "sha256";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Maximum number of layers accepted in a manifest.
pub const MAX_IMAGE_LAYERS: usize = 128;

/// Prefix of the per-run ephemeral root directory.
pub const ROOTFS_DIR_PREFIX: &str = "corral-root-";

/// Prefix of the per-build layer staging directory.
pub const STAGING_DIR_PREFIX: &str = "corral-layers-";

/// Mode given to an executable staged into a bare jail.
pub const STAGED_EXECUTABLE_MODE: u32 = 0o755;

/// Exit status reported when corral itself fails.
pub const EXIT_INTERNAL_FAILURE: i32 = 1;

/// Exit status reported when a run is interrupted before its command exits.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Offset added to a signal number to form the exit status of a killed child.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

/// Application name used in log output.
pub const APP_NAME: &str = "corral";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "corral";

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn";

//! Registered error codes, grouped by package.
//!
//! Codes follow the grammar `package(.sub_component)?.error_code`. Every
//! constant here is covered by the round-trip test in `error.rs`; adding a
//! code means adding it to [`ALL`] as well.

// common.* — shared failure classes
pub const COMMON_INTERNAL: &str = "common.internal";
pub const COMMON_NOT_FOUND: &str = "common.not_found";
pub const COMMON_VALIDATION: &str = "common.validation";
pub const COMMON_TIMEOUT: &str = "common.timeout";
pub const COMMON_CANCELLED: &str = "common.cancelled";
pub const COMMON_UNAUTHORIZED: &str = "common.unauthorized";
pub const COMMON_FORBIDDEN: &str = "common.forbidden";
pub const COMMON_CONFLICT: &str = "common.conflict";
pub const COMMON_UNSUPPORTED: &str = "common.unsupported";
pub const COMMON_INVALID_INPUT: &str = "common.invalid_input";
pub const COMMON_ALREADY_EXISTS: &str = "common.already_exists";

// loader.*
pub const LOADER_COMPONENT_INIT_FAILED: &str = "loader.component_init_failed";
pub const LOADER_GATEWAY_START_FAILED: &str = "loader.gateway_start_failed";

// gateway.*
pub const GATEWAY_HTTP_SERVER_CREATION_FAILED: &str = "gateway.http_server_creation_failed";
pub const GATEWAY_JDBC_SERVER_CREATION_FAILED: &str = "gateway.jdbc_server_creation_failed";
pub const GATEWAY_NATIVE_SERVER_CREATION_FAILED: &str = "gateway.native_server_creation_failed";
pub const GATEWAY_ALL_SERVERS_FAILED_TO_START: &str = "gateway.all_servers_failed_to_start";
pub const GATEWAY_ALREADY_STARTED: &str = "gateway.already_started";
pub const GATEWAY_STOP_FAILED: &str = "gateway.stop_failed";
pub const GATEWAY_TOO_MANY_CONNECTIONS: &str = "gateway.too_many_connections";

// query.*
pub const QUERY_PARSE_FAILED: &str = "query.parse_failed";
pub const QUERY_VALIDATION_FAILED: &str = "query.validation_failed";
pub const QUERY_NOT_RUNNING: &str = "query.not_running";
pub const QUERY_NOT_FOUND: &str = "query.not_found";
pub const QUERY_UNSUPPORTED_STATEMENT: &str = "query.unsupported_statement";
pub const QUERY_DATABASE_NOT_FOUND: &str = "query.database_not_found";

// create_table.* — CREATE TABLE pipeline stages
pub const CREATE_TABLE_PARSE_SYNTAX_ERROR: &str = "create_table.parse.syntax_error";
pub const CREATE_TABLE_PARSE_TYPE_VALIDATION: &str = "create_table.parse.type_validation";
pub const CREATE_TABLE_REGISTRY_DUPLICATE_TABLE: &str = "create_table.registry.duplicate_table";
pub const CREATE_TABLE_REGISTRY_TRANSACTION_ERROR: &str = "create_table.registry.transaction_error";
pub const CREATE_TABLE_STORAGE_OPERATION_ERROR: &str = "create_table.storage.operation_error";
pub const CREATE_TABLE_EVENT_PROCESSING: &str = "create_table.astha.event_processing";
pub const CREATE_TABLE_SCHEMA_CACHE_OPERATION_ERROR: &str =
    "create_table.schema_cache.operation_error";

// types.*
pub const TYPES_INVALID_PRIMITIVE_TYPE: &str = "types.invalid_primitive_type";
pub const TYPES_INVALID_DECIMAL_PRECISION: &str = "types.invalid_decimal_precision";
pub const TYPES_INVALID_DECIMAL_SCALE: &str = "types.invalid_decimal_scale";
pub const TYPES_DECIMAL_SCALE_EXCEEDS_PRECISION: &str = "types.decimal_scale_exceeds_precision";
pub const TYPES_INVALID_LIST_ELEMENT: &str = "types.invalid_list_element";
pub const TYPES_INVALID_MAP_KEY_TYPE: &str = "types.invalid_map_key_type";
pub const TYPES_INVALID_MAP_VALUE_TYPE: &str = "types.invalid_map_value_type";
pub const TYPES_INVALID_STRUCT_FIELD: &str = "types.invalid_struct_field";
pub const TYPES_UNSUPPORTED_TYPE: &str = "types.unsupported_type";

// registry.*
pub const REGISTRY_BUN_MIGRATION_FAILED: &str = "registry.bun_migration_failed";
pub const REGISTRY_BUN_SCHEMA_VERIFICATION_FAILED: &str =
    "registry.bun_schema_verification_failed";

// storage.*
pub const STORAGE_OPERATION_ERROR: &str = "storage.operation_error";
pub const STORAGE_DATABASE_NOT_FOUND: &str = "storage.database_not_found";
pub const STORAGE_TABLE_NOT_FOUND: &str = "storage.table_not_found";

// client.* / client_config.*
pub const CLIENT_CONNECTION: &str = "client.connection";
pub const CLIENT_SDK: &str = "client.sdk";
pub const CLIENT_QUERY: &str = "client.query";
pub const CLIENT_FILE: &str = "client.file";
pub const CLIENT_TABLE: &str = "client.table";
pub const CLIENT_NAMESPACE: &str = "client.namespace";
pub const CLIENT_CONFIG_INVALID: &str = "client_config.invalid";
pub const CLIENT_CONFIG_NOT_FOUND: &str = "client_config.not_found";

/// Every registered code; kept in sync by the tests that parse each entry.
pub const ALL: &[&str] = &[
    COMMON_INTERNAL,
    COMMON_NOT_FOUND,
    COMMON_VALIDATION,
    COMMON_TIMEOUT,
    COMMON_CANCELLED,
    COMMON_UNAUTHORIZED,
    COMMON_FORBIDDEN,
    COMMON_CONFLICT,
    COMMON_UNSUPPORTED,
    COMMON_INVALID_INPUT,
    COMMON_ALREADY_EXISTS,
    LOADER_COMPONENT_INIT_FAILED,
    LOADER_GATEWAY_START_FAILED,
    GATEWAY_HTTP_SERVER_CREATION_FAILED,
    GATEWAY_JDBC_SERVER_CREATION_FAILED,
    GATEWAY_NATIVE_SERVER_CREATION_FAILED,
    GATEWAY_ALL_SERVERS_FAILED_TO_START,
    GATEWAY_ALREADY_STARTED,
    GATEWAY_STOP_FAILED,
    GATEWAY_TOO_MANY_CONNECTIONS,
    QUERY_PARSE_FAILED,
    QUERY_VALIDATION_FAILED,
    QUERY_NOT_RUNNING,
    QUERY_NOT_FOUND,
    QUERY_UNSUPPORTED_STATEMENT,
    QUERY_DATABASE_NOT_FOUND,
    CREATE_TABLE_PARSE_SYNTAX_ERROR,
    CREATE_TABLE_PARSE_TYPE_VALIDATION,
    CREATE_TABLE_REGISTRY_DUPLICATE_TABLE,
    CREATE_TABLE_REGISTRY_TRANSACTION_ERROR,
    CREATE_TABLE_STORAGE_OPERATION_ERROR,
    CREATE_TABLE_EVENT_PROCESSING,
    CREATE_TABLE_SCHEMA_CACHE_OPERATION_ERROR,
    TYPES_INVALID_PRIMITIVE_TYPE,
    TYPES_INVALID_DECIMAL_PRECISION,
    TYPES_INVALID_DECIMAL_SCALE,
    TYPES_DECIMAL_SCALE_EXCEEDS_PRECISION,
    TYPES_INVALID_LIST_ELEMENT,
    TYPES_INVALID_MAP_KEY_TYPE,
    TYPES_INVALID_MAP_VALUE_TYPE,
    TYPES_INVALID_STRUCT_FIELD,
    TYPES_UNSUPPORTED_TYPE,
    REGISTRY_BUN_MIGRATION_FAILED,
    REGISTRY_BUN_SCHEMA_VERIFICATION_FAILED,
    STORAGE_OPERATION_ERROR,
    STORAGE_DATABASE_NOT_FOUND,
    STORAGE_TABLE_NOT_FOUND,
    CLIENT_CONNECTION,
    CLIENT_SDK,
    CLIENT_QUERY,
    CLIENT_FILE,
    CLIENT_TABLE,
    CLIENT_NAMESPACE,
    CLIENT_CONFIG_INVALID,
    CLIENT_CONFIG_NOT_FOUND,
];

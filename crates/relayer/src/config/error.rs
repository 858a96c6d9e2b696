use flex_error::{define_error, TraceError};

define_error! {
    Error {
        Io
            [ TraceError<std::io::Error> ]
            |_| { "config I/O error" },

        Decode
            [ TraceError<toml::de::Error> ]
            |_| { "invalid configuration" },

        Encode
            [ TraceError<toml::ser::Error> ]
            |_| { "invalid configuration" },

        InvalidGasPrice
            { price: String }
            |e| { format!("invalid gas price: {}", e.price) },

        InvalidGasAdjustment
            { value: String }
            |e| { format!("invalid gas adjustment '{}', expected a positive number", e.value) },

        InvalidTrustingPeriod
            { value: String, chain_id: String }
            [ TraceError<humantime::DurationError> ]
            |e| {
                format!("failed to parse trusting period ({}) for chain {}",
                    e.value, e.chain_id)
            },

        InvalidRpcAddr
            { value: String }
            |e| { format!("invalid RPC address: {}", e.value) },

        InvalidChainId
            { value: String }
            |e| { format!("invalid chain identifier: {}", e.value) },

        EmptyAccountPrefix
            { chain_id: String }
            |e| { format!("account prefix for chain {} cannot be empty", e.chain_id) },

        UnknownField
            { key: String }
            |e| { format!("key {} not found", e.key) },

        MissingChainConfig
            { chain_id: String }
            |e| { format!("chain with ID {} is not configured", e.chain_id) },
    }
}

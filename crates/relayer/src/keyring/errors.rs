use flex_error::{define_error, TraceError};

define_error! {
    Error {
        KeyNotFound
            { name: String }
            |e| { format!("cannot find key '{}' in the key store", e.name) },

        ExistingKey
            { name: String }
            |e| { format!("key '{}' already exists in the key store", e.name) },

        InvalidMnemonic
            { reason: String }
            |e| { format!("invalid mnemonic: {}", e.reason) },

        InvalidHdPath
            { path: String }
            |e| { format!("invalid derivation path: {}", e.path) },

        PrivateKey
            { reason: String }
            |e| { format!("cannot generate private key: {}", e.reason) },

        InvalidKeyName
            { name: String }
            |e| { format!("invalid key name '{}': must be a single non-empty path component", e.name) },

        InvalidKey
            { name: String, reason: String }
            |e| { format!("invalid key '{}': {}", e.name, e.reason) },

        KeyStore
            { path: String }
            [ TraceError<std::io::Error> ]
            |e| { format!("key store I/O error at {}", e.path) },

        KeyFile
            { path: String }
            [ TraceError<serde_json::Error> ]
            |e| { format!("cannot read or write key file {}", e.path) },
    }
}

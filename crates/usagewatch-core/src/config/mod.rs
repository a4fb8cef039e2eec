mod settings;

pub use settings::UsageSettings;

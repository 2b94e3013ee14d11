/// Valid time, in Unix seconds.
/// Example: `1_199_145_600` (2008-01-01 00 UTC)
pub type UnixSeconds = i64;
/// Predictor field name.
/// Examples: `temperature_kelvins`, `height_m_asl`
pub type FieldName = String;
/// Pressure level in millibars; `1013` stands for the surface.
/// Examples: `850`, `1000`, `1013`
pub type PressureMb = i32;
/// Encoded example identifier.
/// Example: `time1199145600_row140_column215`
pub type ExampleIdString = String;
/// Shuffled-store batch number.
/// Example: `1042`
pub type BatchNumber = u64;

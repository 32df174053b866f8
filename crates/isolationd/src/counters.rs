//! Telemetry counter names consumed by the detector

/// Received packets
pub const RCV_PACKETS_COUNTER: &str = "PortRcvPktsExtended";

/// Local receive errors
pub const RCV_ERRORS_COUNTER: &str = "PortRcvErrorsExtended";

/// Receive errors reported by the remote physical layer
pub const RCV_REMOTE_PHY_ERROR_COUNTER: &str = "PortRcvRemotePhysicalErrorsExtended";

/// Cable module temperature (Celsius)
pub const TEMP_COUNTER: &str = "Module_Temperature";

/// Active FEC mode code
pub const FEC_MODE: &str = "fec_mode_active";

/// Bit error rate variants
pub const RAW_BER: &str = "raw_ber";
pub const EFF_BER: &str = "eff_ber";
pub const SYMBOL_BER: &str = "symbol_ber";

/// Baseline key for the summed local + remote receive errors
pub const ERRORS_COUNTER: &str = "errors";

use crate::answers::{
    Descriptor, RPLIDAR_ANS_TYPE_GET_LIDAR_CONF, RPLIDAR_CONF_MAX_VALUE_SIZE,
    RPLIDAR_CONF_TYPE_ECHO_SIZE,
};
use crate::base::{CommandChannel, Error, Message, Result, Transport};
use crate::cmds::*;
use crate::types::{Configuration, ScanModeConfiguration};
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace};
use std::collections::BTreeMap;
use std::time::Duration;

/// Fetches the typical mode and every scan mode's parameters.
///
/// Any failed sub-query aborts the whole fetch.
pub fn read_configuration<T: Transport>(
    channel: &mut CommandChannel<T>,
    timeout: Duration,
) -> Result<Configuration> {
    let typical_mode = get_typical_scan_mode(channel, timeout)?;
    let count = get_scan_mode_count(channel, timeout)?;
    trace!("Device reports {} scan modes, typical {}", count, typical_mode);

    let mut modes = BTreeMap::new();
    for id in 0..count {
        let mode = ScanModeConfiguration {
            name: get_scan_mode_name(channel, id, timeout)?,
            us_per_sample: get_scan_mode_us_per_sample(channel, id, timeout)?,
            max_distance: get_scan_mode_max_distance(channel, id, timeout)?,
            answer_type: get_scan_mode_ans_type(channel, id, timeout)?,
        };
        trace!("Scan mode {}: {}", id, mode);
        modes.insert(id, mode);
    }

    Ok(Configuration {
        typical_mode,
        modes,
    })
}

/// Sends one configuration query and returns the response payload past the echoed type.
///
/// `expected_len` is the value length, `None` for variable-length values.
fn get_lidar_conf_with_param<T: Transport>(
    channel: &mut CommandChannel<T>,
    config_type: u32,
    param: &[u8],
    expected_len: Option<usize>,
    timeout: Duration,
) -> Result<Vec<u8>> {
    trace!(
        "Getting lidar config type {:08X} with param {:?}",
        config_type,
        param
    );
    let mut data = Vec::with_capacity(RPLIDAR_CONF_TYPE_ECHO_SIZE + param.len());
    data.extend_from_slice(&config_type.to_le_bytes());
    data.extend_from_slice(param);
    channel.send_command(&Message::with_data(RPLIDAR_CMD_GET_LIDAR_CONF, &data))?;

    let expected = match expected_len {
        Some(len) => Descriptor::new(
            (RPLIDAR_CONF_TYPE_ECHO_SIZE + len) as u32,
            true,
            RPLIDAR_ANS_TYPE_GET_LIDAR_CONF,
        ),
        None => Descriptor::any_length(true, RPLIDAR_ANS_TYPE_GET_LIDAR_CONF),
    };
    let descriptor = channel.wait_for_descriptor(&expected, timeout)?;
    let len = descriptor.payload_len();
    if len < RPLIDAR_CONF_TYPE_ECHO_SIZE {
        error!("Config response of {} bytes is too short", len);
        return Err(Error::protocol("config response too short"));
    }
    if len > RPLIDAR_CONF_TYPE_ECHO_SIZE + RPLIDAR_CONF_MAX_VALUE_SIZE {
        error!("Config response of {} bytes is too long", len);
        return Err(Error::protocol(format!(
            "config response of {} bytes is too long",
            len
        )));
    }

    let mut payload = channel.read_exact(len, timeout)?;
    let echoed_type = LittleEndian::read_u32(&payload[..RPLIDAR_CONF_TYPE_ECHO_SIZE]);
    if echoed_type != config_type {
        error!(
            "Config response type mismatch: got {:08X}, expected {:08X}",
            echoed_type, config_type
        );
        return Err(Error::protocol(format!(
            "config response echoes type {:08X} instead of {:08X}",
            echoed_type, config_type
        )));
    }

    Ok(payload.split_off(RPLIDAR_CONF_TYPE_ECHO_SIZE))
}

fn mode_param(scan_mode: u16) -> [u8; 2] {
    let mut param = [0; 2];
    LittleEndian::write_u16(&mut param, scan_mode);
    param
}

pub fn get_typical_scan_mode<T: Transport>(
    channel: &mut CommandChannel<T>,
    timeout: Duration,
) -> Result<u16> {
    let data =
        get_lidar_conf_with_param(channel, RPLIDAR_CONF_SCAN_MODE_TYPICAL, &[], Some(2), timeout)?;
    Ok(LittleEndian::read_u16(&data))
}

pub fn get_scan_mode_count<T: Transport>(
    channel: &mut CommandChannel<T>,
    timeout: Duration,
) -> Result<u16> {
    let data =
        get_lidar_conf_with_param(channel, RPLIDAR_CONF_SCAN_MODE_COUNT, &[], Some(2), timeout)?;
    Ok(LittleEndian::read_u16(&data))
}

/// Mode name, cut at the first NUL.
pub fn get_scan_mode_name<T: Transport>(
    channel: &mut CommandChannel<T>,
    scan_mode: u16,
    timeout: Duration,
) -> Result<String> {
    let data = get_lidar_conf_with_param(
        channel,
        RPLIDAR_CONF_SCAN_MODE_NAME,
        &mode_param(scan_mode),
        None,
        timeout,
    )?;
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    match std::str::from_utf8(&data[..end]) {
        Ok(name) if name.is_ascii() => Ok(name.to_owned()),
        _ => {
            error!("Scan mode {} name is not ASCII: {:02X?}", scan_mode, data);
            Err(Error::protocol("invalid scan mode name"))
        }
    }
}

/// Sample duration in microseconds.
pub fn get_scan_mode_us_per_sample<T: Transport>(
    channel: &mut CommandChannel<T>,
    scan_mode: u16,
    timeout: Duration,
) -> Result<f32> {
    let data = get_lidar_conf_with_param(
        channel,
        RPLIDAR_CONF_SCAN_MODE_US_PER_SAMPLE,
        &mode_param(scan_mode),
        Some(4),
        timeout,
    )?;
    Ok(LittleEndian::read_u32(&data) as f32 / 256.0)
}

/// Maximum distance in meters.
pub fn get_scan_mode_max_distance<T: Transport>(
    channel: &mut CommandChannel<T>,
    scan_mode: u16,
    timeout: Duration,
) -> Result<f32> {
    let data = get_lidar_conf_with_param(
        channel,
        RPLIDAR_CONF_SCAN_MODE_MAX_DISTANCE,
        &mode_param(scan_mode),
        Some(4),
        timeout,
    )?;
    Ok(LittleEndian::read_u32(&data) as f32 / 256.0)
}

pub fn get_scan_mode_ans_type<T: Transport>(
    channel: &mut CommandChannel<T>,
    scan_mode: u16,
    timeout: Duration,
) -> Result<u8> {
    let data = get_lidar_conf_with_param(
        channel,
        RPLIDAR_CONF_SCAN_MODE_ANS_TYPE,
        &mode_param(scan_mode),
        Some(1),
        timeout,
    )?;
    Ok(data[0])
}

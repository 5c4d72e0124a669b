//! Frames for the CAN sound board.
//!
//! Only frame construction lives here. Transmission, acknowledgement and
//! retry belong to the bus driver.
//!
//! Layout of both command frames:
//!
//! | byte | meaning                              |
//! |------|--------------------------------------|
//! | 0    | command id                           |
//! | 1    | flags                                |
//! | 2-3  | sound index, little endian           |
//! | 4    | volume override, `0xFF` = use pot    |
//! | 5-6  | request id, little endian            |
//! | 7    | reserved, zero                       |

/// Frame id of a play request.
pub const PLAY_SOUND_FRAME_ID: u16 = 0x420;
/// Frame id of a stop request.
pub const STOP_SOUND_FRAME_ID: u16 = 0x421;

pub const CMD_PLAY_SOUND: u8 = 0x01;
pub const CMD_STOP_SOUND: u8 = 0x02;

pub const FLAG_INTERRUPT: u8 = 1 << 0;
pub const FLAG_HIGH_PRIORITY: u8 = 1 << 1;
pub const FLAG_LOOP: u8 = 1 << 2;

/// Stop flag: stop every playing sound, not only `index`.
pub const FLAG_STOP_ALL: u8 = 1 << 0;

/// Volume byte meaning "use the board's potentiometer".
pub const VOLUME_FROM_POT: u8 = 0xFF;

/// Play `index` at the board's own volume.
pub fn build_play_sound(index: u16, flags: u8, request_id: u16) -> [u8; 8] {
    build_play_sound_with_volume(index, flags, VOLUME_FROM_POT, request_id)
}

/// Play `index` with an explicit volume (0-100).
pub fn build_play_sound_with_volume(index: u16, flags: u8, volume: u8, request_id: u16) -> [u8; 8] {
    frame(CMD_PLAY_SOUND, flags, index, volume, request_id)
}

pub fn build_stop_sound(index: u16, flags: u8, request_id: u16) -> [u8; 8] {
    frame(CMD_STOP_SOUND, flags, index, 0, request_id)
}

fn frame(cmd: u8, flags: u8, index: u16, volume: u8, request_id: u16) -> [u8; 8] {
    let [index_lo, index_hi] = index.to_le_bytes();
    let [req_lo, req_hi] = request_id.to_le_bytes();
    [cmd, flags, index_lo, index_hi, volume, req_lo, req_hi, 0]
}

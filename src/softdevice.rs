//! S140 SoftDevice backend for the radio task.
//!
//! Drives the SoftDevice through its raw SVC interface so every init and
//! enable failure surfaces as a `StackError` instead of a panic.  BLE
//! events are pulled with `sd_ble_evt_get` from inside the radio task and
//! translated to [`StackEvent`]s; operations the SoftDevice completes
//! synchronously (enable, advertising start, key generation) queue the
//! matching completion event themselves.
//!
//! All buffers the SoftDevice keeps pointers into live in a
//! `'static` [`StackBuffers`].

use core::mem;
use core::ptr;

use ble_battery::ble::advertising::{battery_advertisement, BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
use ble_battery::ble::security::{AuthError, AuthInfo, KeyDistribution, SecurityKeyInfo, SecurityKeyParam, SecurityLevel};
use ble_battery::ble::stack::{BleStack, IdleDeferred};
use ble_battery::ble::{
    AddressKind, AdvertisementState, AdvertisingMode, CharacteristicIndex, ConnectionHandle,
    DeviceAddress, ServiceIndex, StackEvent,
};
use ble_battery::config::{
    BATTERY_LEVEL_MAX, BLE_ADV_DURATION_FAST, BLE_ADV_DURATION_SLOW, BLE_ADV_INTERVAL_FAST,
    BLE_ADV_INTERVAL_SLOW, BLE_DEVICE_NAME, BLE_MAX_CONNECTIONS,
};
use ble_battery::error::StackError;
use defmt::{info, warn};
use heapless::Deque;
use nrf_softdevice::raw;

/// Largest BLE event pulled from the SoftDevice (default ATT MTU).
const EVT_BUF_LEN: usize = 128;

/// Events synthesised by the adapter, waiting to be polled.
const PENDING_EVENTS: usize = 8;

/// CCCD bit enabling notifications.
const CCCD_NOTIFY: u8 = 0x01;

extern "C" {
    static mut __sdata: u32;
}

fn app_ram_base() -> u32 {
    unsafe { ptr::addr_of!(__sdata) as u32 }
}

unsafe extern "C" fn fault_handler(id: u32, pc: u32, info: u32) {
    defmt::panic!("SoftDevice fault: id={=u32} pc={=u32:#x} info={=u32:#x}", id, pc, info);
}

fn check(ret: u32) -> Result<(), StackError> {
    match ret {
        raw::NRF_SUCCESS => Ok(()),
        raw::NRF_ERROR_INVALID_STATE => Err(StackError::InvalidState),
        raw::NRF_ERROR_INVALID_PARAM => Err(StackError::InvalidParameter),
        raw::NRF_ERROR_NO_MEM => Err(StackError::NoMemory),
        raw::NRF_ERROR_BUSY => Err(StackError::Busy),
        code => Err(StackError::Raw(code)),
    }
}

/// SoftDevice configuration applied by [`BleStack::init`].
pub struct SoftdeviceConfig {
    pub clock: raw::nrf_clock_lf_cfg_t,
    pub periph_role_count: u8,
    pub device_name: &'static str,
}

impl Default for SoftdeviceConfig {
    fn default() -> Self {
        Self {
            clock: raw::nrf_clock_lf_cfg_t {
                source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
                rc_ctiv: 0,
                rc_temp_ctiv: 0,
                accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
            },
            periph_role_count: BLE_MAX_CONNECTIONS,
            device_name: BLE_DEVICE_NAME,
        }
    }
}

#[repr(C, align(4))]
struct EventBuffer([u8; EVT_BUF_LEN]);

/// Memory the SoftDevice reads from or writes into asynchronously.
pub struct StackBuffers {
    evt: EventBuffer,
    adv_data: [u8; 31],
    own_enc: raw::ble_gap_enc_key_t,
    own_id: raw::ble_gap_id_key_t,
    own_sign: raw::ble_gap_sign_info_t,
    peer_enc: raw::ble_gap_enc_key_t,
    peer_id: raw::ble_gap_id_key_t,
    peer_sign: raw::ble_gap_sign_info_t,
}

impl StackBuffers {
    pub const fn new() -> Self {
        // All-zero is a valid value for every SoftDevice struct held here.
        unsafe { mem::zeroed() }
    }
}

pub struct SoftdeviceStack {
    buffers: &'static mut StackBuffers,
    pending: Deque<StackEvent, PENDING_EVENTS>,
    on: bool,
    advertising: bool,
    connections: u8,
    adv_handle: u8,
    battery: raw::ble_gatts_char_handles_t,
    notifications: bool,
    local_keys: KeyDistribution,
    exchange_keys: KeyDistribution,
    /// Identity address waiting for the radio to go idle.
    identity_address: IdleDeferred<raw::ble_gap_addr_t>,
}

impl SoftdeviceStack {
    pub fn new(buffers: &'static mut StackBuffers) -> Self {
        Self {
            buffers,
            pending: Deque::new(),
            on: false,
            advertising: false,
            connections: 0,
            adv_handle: raw::BLE_GAP_ADV_SET_HANDLE_NOT_SET as u8,
            battery: raw::ble_gatts_char_handles_t {
                value_handle: 0,
                user_desc_handle: 0,
                cccd_handle: 0,
                sccd_handle: 0,
            },
            notifications: false,
            local_keys: KeyDistribution::NONE,
            exchange_keys: KeyDistribution::NONE,
            identity_address: IdleDeferred::new(),
        }
    }

    fn push(&mut self, event: StackEvent) {
        if self.pending.push_back(event).is_err() {
            warn!("softdevice: pending events full, dropped {}", event);
        }
    }

    /// Apply a pending identity address once nothing is advertising or
    /// connected, reporting `SetDeviceAddressComplete`.
    fn apply_pending_address(&mut self) {
        let Some(addr) = self.identity_address.take_if_idle(self.advertising, self.connections) else {
            return;
        };
        match check(unsafe { raw::sd_ble_gap_addr_set(&addr) }) {
            Ok(()) => self.push(StackEvent::SetDeviceAddressComplete),
            Err(e) => warn!("identity address rejected: {}", e),
        }
    }

    fn set_cfg(&mut self, id: u32, cfg: &raw::ble_cfg_t) -> Result<(), StackError> {
        check(unsafe { raw::sd_ble_cfg_set(id, cfg, app_ram_base()) })
    }

    fn add_battery_service(&mut self) -> Result<(), StackError> {
        let service_uuid = raw::ble_uuid_t {
            uuid: BATTERY_SERVICE_UUID,
            type_: raw::BLE_UUID_TYPE_BLE as u8,
        };
        let mut service = 0u16;
        check(unsafe {
            raw::sd_ble_gatts_service_add(
                raw::BLE_GATTS_SRVC_TYPE_PRIMARY as u8,
                &service_uuid,
                &mut service,
            )
        })?;

        // Open read and CCCD write, value stored by the stack.
        let mut cccd_md: raw::ble_gatts_attr_md_t = unsafe { mem::zeroed() };
        cccd_md.read_perm.set_sm(1);
        cccd_md.read_perm.set_lv(1);
        cccd_md.write_perm.set_sm(1);
        cccd_md.write_perm.set_lv(1);
        cccd_md.set_vloc(raw::BLE_GATTS_VLOC_STACK as u8);

        let mut char_md: raw::ble_gatts_char_md_t = unsafe { mem::zeroed() };
        char_md.char_props.set_read(1);
        char_md.char_props.set_notify(1);
        char_md.p_cccd_md = &cccd_md;

        let mut attr_md: raw::ble_gatts_attr_md_t = unsafe { mem::zeroed() };
        attr_md.read_perm.set_sm(1);
        attr_md.read_perm.set_lv(1);
        attr_md.set_vloc(raw::BLE_GATTS_VLOC_STACK as u8);

        let char_uuid = raw::ble_uuid_t {
            uuid: BATTERY_LEVEL_UUID,
            type_: raw::BLE_UUID_TYPE_BLE as u8,
        };
        let initial = [BATTERY_LEVEL_MAX];
        let attr = raw::ble_gatts_attr_t {
            p_uuid: &char_uuid,
            p_attr_md: &attr_md,
            init_len: 1,
            init_offs: 0,
            max_len: 1,
            p_value: initial.as_ptr() as *mut u8,
        };

        check(unsafe {
            raw::sd_ble_gatts_characteristic_add(service, &char_md, &attr, &mut self.battery)
        })
    }

    /// Translate the event sitting in the event buffer.
    fn translate(&mut self) {
        let evt = unsafe { &*(self.buffers.evt.0.as_ptr() as *const raw::ble_evt_t) };
        let id = evt.header.evt_id as u32;

        match id {
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONNECTED => {
                let conn = unsafe { evt.evt.gap_evt.conn_handle };
                self.connections = self.connections.saturating_add(1);
                if self.advertising {
                    self.advertising = false;
                    self.push(StackEvent::AdvertisementStartStop);
                }
                let bd_handle = conn as u8;
                self.push(StackEvent::GapDeviceConnected { bd_handle });
                self.push(StackEvent::GattConnected(ConnectionHandle {
                    bd_handle,
                    att_id: 0,
                }));
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_DISCONNECTED => {
                let reason = unsafe { evt.evt.gap_evt.params.disconnected.reason };
                self.connections = self.connections.saturating_sub(1);
                self.notifications = false;
                self.push(StackEvent::GattDisconnected);
                self.push(StackEvent::GapDeviceDisconnected { reason });
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONN_PARAM_UPDATE => {
                self.push(StackEvent::ConnectionUpdateComplete)
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_SEC_PARAMS_REQUEST => {
                let conn = unsafe { evt.evt.gap_evt.conn_handle };
                self.push(StackEvent::AuthRequest {
                    bd_handle: conn as u8,
                });
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_SEC_INFO_REQUEST => {
                // No stored bonds: answer "no keys".
                let conn = unsafe { evt.evt.gap_evt.conn_handle };
                let ret = unsafe {
                    raw::sd_ble_gap_sec_info_reply(conn, ptr::null(), ptr::null(), ptr::null())
                };
                if ret != raw::NRF_SUCCESS {
                    warn!("sec_info_reply failed: {=u32:#x}", ret);
                }
                self.push(StackEvent::Other(id));
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_AUTH_STATUS => {
                let status = unsafe { evt.evt.gap_evt.params.auth_status.auth_status };
                if status == raw::BLE_GAP_SEC_STATUS_SUCCESS as u8 {
                    self.push(StackEvent::AuthComplete);
                } else {
                    self.push(StackEvent::AuthFailed { error: status });
                }
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONN_SEC_UPDATE => self.push(StackEvent::EncryptionChanged),
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_TIMEOUT => self.push(StackEvent::Timeout),
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_ADV_SET_TERMINATED => {
                self.advertising = false;
                self.push(StackEvent::AdvertisementStartStop);
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_PHY_UPDATE_REQUEST => {
                let conn = unsafe { evt.evt.gap_evt.conn_handle };
                let phys = raw::ble_gap_phys_t {
                    tx_phys: raw::BLE_GAP_PHY_AUTO as u8,
                    rx_phys: raw::BLE_GAP_PHY_AUTO as u8,
                };
                unsafe { raw::sd_ble_gap_phy_update(conn, &phys) };
                self.push(StackEvent::Other(id));
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_DATA_LENGTH_UPDATE_REQUEST => {
                let conn = unsafe { evt.evt.gap_evt.conn_handle };
                unsafe { raw::sd_ble_gap_data_length_update(conn, ptr::null(), ptr::null_mut()) };
                self.push(StackEvent::Other(id));
            }
            raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_WRITE => {
                let write = unsafe { &evt.evt.gatts_evt.params.write };
                if write.handle == self.battery.cccd_handle {
                    let data = unsafe { write.data.as_slice(write.len as usize) };
                    let enabled = data.first().is_some_and(|b| b & CCCD_NOTIFY != 0);
                    self.notifications = enabled;
                    self.push(if enabled {
                        StackEvent::BatteryNotificationsEnabled
                    } else {
                        StackEvent::BatteryNotificationsDisabled
                    });
                } else {
                    self.push(StackEvent::BatteryOther);
                }
            }
            raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_SYS_ATTR_MISSING => {
                let conn = unsafe { evt.evt.gatts_evt.conn_handle };
                unsafe { raw::sd_ble_gatts_sys_attr_set(conn, ptr::null(), 0, 0) };
                self.push(StackEvent::Other(id));
            }
            raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_EXCHANGE_MTU_REQUEST => {
                let conn = unsafe { evt.evt.gatts_evt.conn_handle };
                unsafe { raw::sd_ble_gatts_exchange_mtu_reply(conn, raw::BLE_GATT_ATT_MTU_DEFAULT as u16) };
                self.push(StackEvent::MtuExchangeRequest);
            }
            other => self.push(StackEvent::Other(other)),
        }
    }
}

impl BleStack for SoftdeviceStack {
    type Config = SoftdeviceConfig;

    fn init(&mut self, config: &SoftdeviceConfig) -> Result<(), StackError> {
        check(unsafe { raw::sd_softdevice_enable(&config.clock, Some(fault_handler)) })?;

        let mut cfg: raw::ble_cfg_t = unsafe { mem::zeroed() };
        cfg.gap_cfg.role_count_cfg = raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: config.periph_role_count,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        };
        self.set_cfg(raw::BLE_GAP_CFGS_BLE_GAP_CFG_ROLE_COUNT, &cfg)?;

        let name_len = config.device_name.len() as u16;
        let mut cfg: raw::ble_cfg_t = unsafe { mem::zeroed() };
        cfg.gap_cfg.device_name_cfg = raw::ble_gap_cfg_device_name_t {
            p_value: config.device_name.as_ptr() as *mut u8,
            current_len: name_len,
            max_len: name_len,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        };
        self.set_cfg(raw::BLE_GAP_CFGS_BLE_GAP_CFG_DEVICE_NAME, &cfg)?;

        info!("softdevice enabled");
        Ok(())
    }

    fn enable(&mut self) -> Result<(), StackError> {
        let mut wanted = app_ram_base();
        let ret = unsafe { raw::sd_ble_enable(&mut wanted) };
        if wanted > app_ram_base() {
            warn!("RAM origin too low for SoftDevice, needs {=u32:#x}", wanted);
        }
        check(ret)?;

        self.add_battery_service()?;

        // Controller interrupt: SWI1_EGU1 fires after every radio event.
        check(unsafe {
            raw::sd_radio_notification_cfg_set(
                raw::NRF_RADIO_NOTIFICATION_TYPES_NRF_RADIO_NOTIFICATION_TYPE_INT_ON_INACTIVE as u8,
                raw::NRF_RADIO_NOTIFICATION_DISTANCES_NRF_RADIO_NOTIFICATION_DISTANCE_NONE as u8,
            )
        })?;

        self.on = true;
        self.push(StackEvent::StackOn);
        Ok(())
    }

    fn enable_low_power_mode(&mut self) {
        let ret = unsafe { raw::sd_power_mode_set(raw::NRF_POWER_MODES_NRF_POWER_MODE_LOWPWR as u8) };
        if ret != raw::NRF_SUCCESS {
            warn!("low power mode rejected: {=u32:#x}", ret);
        }
    }

    fn is_on(&self) -> bool {
        self.on
    }

    fn poll_event(&mut self) -> Option<StackEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if !self.on {
                return None;
            }

            let mut len = EVT_BUF_LEN as u16;
            let ret = unsafe { raw::sd_ble_evt_get(self.buffers.evt.0.as_mut_ptr(), &mut len) };
            match ret {
                raw::NRF_SUCCESS => {
                    self.translate();
                    self.apply_pending_address();
                }
                raw::NRF_ERROR_NOT_FOUND => return None,
                code => {
                    warn!("sd_ble_evt_get failed: {=u32:#x}", code);
                    return None;
                }
            }
        }
    }

    fn advertisement_state(&self) -> AdvertisementState {
        if self.advertising {
            AdvertisementState::Advertising
        } else {
            AdvertisementState::Stopped
        }
    }

    fn active_connection_count(&self) -> u8 {
        self.connections
    }

    fn start_advertising(&mut self, mode: AdvertisingMode, profile: u8) -> Result<(), StackError> {
        let (interval, duration) = match mode {
            AdvertisingMode::Fast => (BLE_ADV_INTERVAL_FAST, BLE_ADV_DURATION_FAST),
            AdvertisingMode::Slow => (BLE_ADV_INTERVAL_SLOW, BLE_ADV_DURATION_SLOW),
        };

        self.apply_pending_address();

        let payload = battery_advertisement(BLE_DEVICE_NAME);
        let len = payload.len();
        self.buffers.adv_data[..len].copy_from_slice(payload.as_bytes());

        let data = raw::ble_gap_adv_data_t {
            adv_data: raw::ble_data_t {
                p_data: self.buffers.adv_data.as_mut_ptr(),
                len: len as u16,
            },
            scan_rsp_data: raw::ble_data_t {
                p_data: ptr::null_mut(),
                len: 0,
            },
        };

        let mut params: raw::ble_gap_adv_params_t = unsafe { mem::zeroed() };
        params.properties.type_ = raw::BLE_GAP_ADV_TYPE_CONNECTABLE_SCANNABLE_UNDIRECTED as u8;
        params.primary_phy = raw::BLE_GAP_PHY_1MBPS as u8;
        params.secondary_phy = raw::BLE_GAP_PHY_1MBPS as u8;
        params.interval = interval;
        params.duration = duration;
        params.filter_policy = raw::BLE_GAP_ADV_FP_ANY as u8;

        check(unsafe { raw::sd_ble_gap_adv_set_configure(&mut self.adv_handle, &data, &params) })?;
        // The profile index doubles as the connection configuration tag.
        check(unsafe { raw::sd_ble_gap_adv_start(self.adv_handle, profile) })?;

        self.advertising = true;
        self.push(StackEvent::AdvertisementStartStop);
        Ok(())
    }

    fn send_notification(
        &mut self,
        conn: ConnectionHandle,
        service: ServiceIndex,
        characteristic: CharacteristicIndex,
        value: &[u8],
    ) -> Result<(), StackError> {
        let handle = match (service, characteristic) {
            (ServiceIndex::Battery, CharacteristicIndex::BatteryLevel) => self.battery.value_handle,
        };
        if !self.notifications {
            return Err(StackError::NotificationsDisabled);
        }

        let mut len = value.len() as u16;
        let params = raw::ble_gatts_hvx_params_t {
            handle,
            type_: raw::BLE_GATT_HVX_NOTIFICATION as u8,
            offset: 0,
            p_len: &mut len,
            p_data: value.as_ptr(),
        };
        match unsafe { raw::sd_ble_gatts_hvx(conn.bd_handle as u16, &params) } {
            raw::BLE_ERROR_GATTS_SYS_ATTR_MISSING => Err(StackError::NotificationsDisabled),
            ret => check(ret),
        }
    }

    fn generate_keys(&mut self, _info: &SecurityKeyInfo) -> Result<(), StackError> {
        let mut params = SecurityKeyParam::default();
        check(unsafe { raw::sd_rand_application_vector_get(params.irk.as_mut_ptr(), 16) })?;
        check(unsafe { raw::sd_rand_application_vector_get(params.csrk.as_mut_ptr(), 16) })?;
        self.push(StackEvent::KeysGenerated(params));
        Ok(())
    }

    fn set_security_keys(&mut self, info: &SecurityKeyInfo) -> Result<(), StackError> {
        self.buffers.own_id.id_info.irk = info.params.irk;
        self.buffers.own_sign.csrk = info.params.csrk;
        self.local_keys = info.local_keys;
        self.exchange_keys = info.exchange_keys;
        Ok(())
    }

    fn set_identity_address(&mut self, address: &DeviceAddress) -> Result<(), StackError> {
        let mut addr: raw::ble_gap_addr_t = unsafe { mem::zeroed() };
        addr.set_addr_type(match address.kind {
            AddressKind::Public => raw::BLE_GAP_ADDR_TYPE_PUBLIC as u8,
            AddressKind::RandomStatic => raw::BLE_GAP_ADDR_TYPE_RANDOM_STATIC as u8,
        });
        addr.addr = address.le_bytes();
        self.buffers.own_id.id_addr_info = addr;

        // The radio address can only change while idle; the identity
        // distributed during pairing is updated immediately.
        self.identity_address.request(addr);
        self.apply_pending_address();
        Ok(())
    }

    fn auth_reply(&mut self, auth: &AuthInfo) -> Result<(), StackError> {
        let conn = auth.bd_handle as u16;

        if auth.auth_error == AuthError::PairingNotSupported {
            return check(unsafe {
                raw::sd_ble_gap_sec_params_reply(
                    conn,
                    raw::BLE_GAP_SEC_STATUS_PAIRING_NOT_SUPP as u8,
                    ptr::null(),
                    ptr::null(),
                )
            });
        }

        let mut params: raw::ble_gap_sec_params_t = unsafe { mem::zeroed() };
        params.set_bond(auth.bonding as u8);
        params.set_mitm(matches!(
            auth.security,
            SecurityLevel::Authenticated | SecurityLevel::SecureConnections
        ) as u8);
        params.set_lesc((auth.security == SecurityLevel::SecureConnections) as u8);
        params.set_io_caps(raw::BLE_GAP_IO_CAPS_NONE as u8);
        params.min_key_size = 7;
        params.max_key_size = auth.encryption_key_size;

        let own = self.local_keys;
        params.kdist_own.set_enc(own.contains(KeyDistribution::INIT_ENC) as u8);
        params.kdist_own.set_id(own.contains(KeyDistribution::INIT_IRK) as u8);
        params.kdist_own.set_sign(own.contains(KeyDistribution::INIT_CSRK) as u8);
        let peer = self.exchange_keys;
        params.kdist_peer.set_enc(peer.contains(KeyDistribution::RESP_ENC) as u8);
        params.kdist_peer.set_id(peer.contains(KeyDistribution::RESP_IRK) as u8);
        params.kdist_peer.set_sign(peer.contains(KeyDistribution::RESP_CSRK) as u8);

        let buffers = &mut *self.buffers;
        let keyset = raw::ble_gap_sec_keyset_t {
            keys_own: raw::ble_gap_sec_keys_t {
                p_enc_key: &mut buffers.own_enc,
                p_id_key: &mut buffers.own_id,
                p_sign_key: &mut buffers.own_sign,
                p_pk: ptr::null_mut(),
            },
            keys_peer: raw::ble_gap_sec_keys_t {
                p_enc_key: &mut buffers.peer_enc,
                p_id_key: &mut buffers.peer_id,
                p_sign_key: &mut buffers.peer_sign,
                p_pk: ptr::null_mut(),
            },
        };

        check(unsafe {
            raw::sd_ble_gap_sec_params_reply(
                conn,
                raw::BLE_GAP_SEC_STATUS_SUCCESS as u8,
                &params,
                &keyset,
            )
        })
    }
}

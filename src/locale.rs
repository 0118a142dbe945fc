/// User-facing strings (Malay).
///
/// Log messages stay in English; only text shown in the window lives here.

pub const APP_TITLE: &str = "Warkah Kasih";
pub const APP_HEADING: &str = "WARKAH KASIH";
pub const APP_KICKER: &str = "Sistem Pintar";
pub const APP_TAGLINE: &str = "Analisis Gaya Kahwin & Penjana Prompt Profesional";
pub const APP_FOOTER: &str = "DIKUASAKAN OLEH";

pub const TAB_ANALYZER: &str = "Analisis Style";
pub const TAB_POSES: &str = "Variasi Pose";

pub const SYSTEM_OFFLINE: &str = "SYSTEM OFFLINE";

pub const AUTH_BANNER_TITLE: &str = "Konfigurasi Firebase Diperlukan";
pub const AUTH_BANNER_BODY: &str =
    "Sila aktifkan \"Anonymous\" & \"Email/Password\" di Firebase Console.";

// Upload area
pub const UPLOAD_PICK: &str = "Pilih Gambar";
pub const UPLOAD_HINT: &str = "JPG, PNG atau WEBP. Boleh juga seret & lepas ke tetingkap.";
pub const UPLOAD_REMOVE: &str = "Buang";
pub const UPLOAD_DIALOG_TITLE: &str = "Pilih Gambar Rujukan";

// Shared alerts
pub const INVALID_FORMAT_TITLE: &str = "Format Tidak Sah";
pub const INVALID_FORMAT_BODY: &str = "Sila muat naik fail gambar JPG, PNG atau WEBP sahaja.";
pub const UNREADABLE_TITLE: &str = "Gambar Tidak Dapat Dibaca";
pub const UNREADABLE_BODY: &str = "Fail gambar tidak dapat dibuka. Sila cuba fail lain.";
pub const MAINTENANCE_TITLE: &str = "Sistem Diselenggara";
pub const MAINTENANCE_BODY: &str =
    "Maaf, servis AI sedang dimatikan oleh Admin untuk penyelenggaraan.";
pub const MISSING_IMAGE_TITLE: &str = "Tiada Gambar";
pub const ERROR_TITLE: &str = "Ralat";
pub const ALERT_CLOSE: &str = "Tutup";
pub const COPY: &str = "SALIN";

// Style analysis tab
pub const ANALYZER_HEADING: &str = "Analisis Style & Tone";
pub const ANALYZER_INFO: &str = "AI akan menganalisis estetik gambar (warna, lighting, mood) dan menghasilkan satu prompt utama untuk ditiru.";
pub const ANALYZER_MISSING_IMAGE: &str =
    "Sila muat naik gambar rujukan gaya kahwin terlebih dahulu.";
pub const ANALYZER_LOADING_TITLE: &str = "Analisis Gaya...";
pub const ANALYZER_LOADING_BODY: &str = "AI sedang membaca tekstur, pencahayaan, dan mood...";
pub const ANALYZER_ERROR: &str = "Sistem gagal memproses gambar. Sila cuba lagi.";
pub const ANALYZER_SUBMIT: &str = "ANALISIS GAYA";
pub const ANALYZER_RESULT: &str = "Prompt Gaya Utama";

// Pose generation tab
pub const POSES_HEADING: &str = "Variasi Pose & Angle";
pub const POSES_INFO: &str = "Muat naik gambar tema, dan AI akan menjana 8 variasi prompt berbeza (Candid, Romantic, Artistic, dll) mengikut estetik gambar tersebut.";
pub const POSES_MISSING_IMAGE: &str = "Sila muat naik gambar rujukan tema terlebih dahulu.";
pub const POSES_LOADING_TITLE: &str = "Menjana Variasi...";
pub const POSES_LOADING_BODY: &str = "AI sedang mencipta 8 jenis pose profesional & candid...";
pub const POSES_ERROR: &str = "Sistem gagal menjana pose. Sila cuba lagi.";
pub const POSES_EMPTY: &str = "AI tidak memulangkan sebarang pose. Sila cuba lagi.";
pub const POSES_SUBMIT: &str = "JANA 8 VARIASI POSE";

// Settings panel
pub const SETTINGS_ADMIN_TITLE: &str = "Admin Control Panel";
pub const SETTINGS_LOCKED_TITLE: &str = "Akses Terhad";
pub const SETTINGS_LOGIN_PROMPT: &str = "Log masuk Admin";
pub const SETTINGS_EMAIL: &str = "Emel Admin";
pub const SETTINGS_PASSWORD: &str = "Kata Laluan";
pub const SETTINGS_LOGIN: &str = "Log Masuk";
pub const SETTINGS_LOGOUT: &str = "Log Keluar";
pub const SETTINGS_STATUS: &str = "Status Sistem";
pub const SETTINGS_STATUS_ON: &str = "Online (Semua Pengguna)";
pub const SETTINGS_STATUS_OFF: &str = "Maintenance (Ditutup)";
pub const SETTINGS_TURN_OFF: &str = "Matikan Sistem (OFF)";
pub const SETTINGS_TURN_ON: &str = "Hidupkan Sistem (ON)";
pub const SETTINGS_LAST_CHANGE: &str = "Kemas kini terakhir";
pub const SETTINGS_WRITE_FAILED: &str = "Gagal menyimpan. Pastikan Firestore Rules anda betul.";
pub const SETTINGS_NOT_ADMIN: &str = "Hanya Admin boleh menukar status sistem.";

pub const LOGIN_FAILED: &str = "Log masuk gagal. Sila semak emel dan kata laluan.";
pub const LOGIN_MISSING_FIELDS: &str = "Sila isi emel dan kata laluan.";

/// Heading for the pose result list, with the number of prompts returned.
pub fn poses_result_heading(count: usize) -> String {
    format!("Senarai Batch Prompt ({count} Variasi)")
}

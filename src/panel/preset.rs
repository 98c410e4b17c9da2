//! Built-in parameter sets for the known panel deployments.
//!
//! Offsets, date windows and query flags were observed against live panels
//! and disagree between deployments. Treat them as starting points: every
//! section can be replaced from the config file.

use super::profile::{OnMissingToken, PanelSpec, QuerySpec, TokenConfig, DEFAULT_USER_AGENT};
use super::window::DateWindow;
use crate::normalize::{Field, InventoryLayout, MessageLayout};

/// Preset names accepted by `preset = "..."`.
pub const NAMES: &[&str] = &["dgroup", "mait", "npmneon", "numberpanel", "numberpanel1"];

const SESSKEY_PATTERN: &str = r"sesskey=([a-zA-Z0-9%=]+)";
const CSSTR_PATTERN: &str = r#"csstr=([^"&']+)"#;
const CSSTR_LITERAL_PATTERN: &str = r#"["']csstr["']\s*[:=]\s*["']([^"']+)["']"#;

const CHROME_MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/143.0.0.0 Mobile Safari/537.36";

/// Look up a preset by name.
pub fn lookup(name: &str) -> Option<PanelSpec> {
    match name {
        "dgroup" => Some(dgroup()),
        "mait" => Some(mait()),
        "npmneon" => Some(npmneon()),
        "numberpanel" => Some(numberpanel()),
        "numberpanel1" => Some(numberpanel1()),
        _ => None,
    }
}

/// One-line description per preset, for `panelbridge presets`.
pub fn describe(name: &str) -> &'static str {
    match name {
        "dgroup" => "/ints client panel, sesskey token with cookie fallback, today's SMS",
        "mait" => "/ints agent panel, csstr token, month-to-date SMS, priced inventory",
        "npmneon" => "/ints agent panel, cookie-only session, today's SMS",
        "numberpanel" => "/NumberPanel agent panel, sesskey token, country-tagged inventory",
        "numberpanel1" => "/NumberPanel client panel, sesskey token, wide fixed SMS window",
        _ => "",
    }
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn query(path: &str, window: DateWindow, s_echo: &str, display_length: i64, sort_dir: &str) -> QuerySpec {
    QuerySpec {
        path: path.to_string(),
        referer: None,
        window,
        send_token: true,
        s_echo: s_echo.to_string(),
        display_length,
        sort_dir: sort_dir.to_string(),
        columns: None,
        full_column_flags: false,
        unsortable_columns: Vec::new(),
        extra: Vec::new(),
    }
}

fn token(param: &str, patterns: &[&str], on_missing: OnMissingToken) -> TokenConfig {
    TokenConfig {
        param: param.to_string(),
        patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
        on_missing,
        cookies_only: false,
    }
}

/// Agent SMS rows: date, range, number, service, user, message, currency, cost, status.
fn agent_sms_layout() -> MessageLayout {
    MessageLayout {
        min_fields: 9,
        date: Field::Column(0),
        range: Field::Column(1),
        number: Field::Column(2),
        service: Field::Column(3),
        message: 5,
        currency: Field::Column(6),
        cost: Field::Column(7),
        status: Some(Field::Column(8)),
        message_strip: vec!["null".into()],
    }
}

/// Client SMS rows: date, range, number, sender, message, then optional cost.
fn client_sms_layout(currency: Field, cost_column: usize, min_fields: usize) -> MessageLayout {
    MessageLayout {
        min_fields,
        date: Field::Column(0),
        range: Field::Column(1),
        number: Field::Column(2),
        service: Field::Column(3),
        message: 4,
        currency,
        cost: Field::Fallback {
            column: cost_column,
            default: "0".into(),
        },
        status: None,
        message_strip: vec!["null".into()],
    }
}

/// Agent inventory rows: checkbox, range, prefix, number, price HTML, action, -, stats.
fn agent_inventory_layout() -> InventoryLayout {
    InventoryLayout {
        min_fields: 8,
        label: Field::Column(1),
        prefix: Field::Column(2),
        number: 3,
        period: Field::BillingPeriod(4),
        price: Field::PriceTag(4),
        stats: Field::Column(7),
        strip_number_separators: false,
    }
}

/// Client inventory rows: range, prefix (often empty), number, payterm, payout, limits.
fn client_inventory_layout(stats: Field) -> InventoryLayout {
    InventoryLayout {
        min_fields: 6,
        label: Field::Column(0),
        prefix: Field::CallingCode,
        number: 2,
        period: Field::Column(3),
        price: Field::Column(4),
        stats,
        strip_number_separators: true,
    }
}

fn dgroup() -> PanelSpec {
    let mut sms = query(
        "/ints/client/res/data_smscdr.php",
        DateWindow::Today,
        "1",
        100,
        "desc",
    );
    sms.referer = Some("/ints/client/SMSCDRStats".into());
    sms.columns = Some(7);
    sms.extra = pairs(&[("frange", ""), ("fnum", ""), ("fcli", ""), ("fg", "0")]);

    let mut numbers = query(
        "/ints/client/res/data_smsnumbers.php",
        DateWindow::Since("2026-01-01".into()),
        "2",
        -1,
        "asc",
    );
    numbers.referer = Some("/ints/client/MySMSNumbers".into());
    numbers.columns = Some(6);
    numbers.extra = pairs(&[("frange", ""), ("fclient", "")]);

    PanelSpec {
        login_path: "/ints/login".into(),
        signin_path: "/ints/signin".into(),
        reports_path: Some("/ints/client/SMSCDRStats".into()),
        reports_referer: Some("/ints/client/SMSDashboard".into()),
        user_agent: DEFAULT_USER_AGENT.into(),
        send_origin: false,
        headers: Vec::new(),
        token: token("sesskey", &[SESSKEY_PATTERN], OnMissingToken::Cookies),
        sms,
        sms_layout: client_sms_layout(Field::Column(5), 6, 6),
        numbers,
        numbers_layout: client_inventory_layout(Field::Column(5)),
    }
}

fn mait() -> PanelSpec {
    let mut sms = query(
        "/ints/agent/res/data_smscdr.php",
        DateWindow::MonthToDate,
        "3",
        100,
        "desc",
    );
    sms.extra = pairs(&[("frange", ""), ("fclient", ""), ("fg", "0")]);

    PanelSpec {
        login_path: "/ints/login".into(),
        signin_path: "/ints/signin".into(),
        reports_path: Some("/ints/agent/SMSCDRReports".into()),
        reports_referer: None,
        user_agent: DEFAULT_USER_AGENT.into(),
        send_origin: false,
        headers: Vec::new(),
        token: token(
            "csstr",
            &[CSSTR_PATTERN, CSSTR_LITERAL_PATTERN],
            OnMissingToken::Cookies,
        ),
        sms,
        sms_layout: agent_sms_layout(),
        numbers: query(
            "/ints/agent/res/data_smsnumbers.php",
            DateWindow::None,
            "2",
            -1,
            "asc",
        ),
        numbers_layout: agent_inventory_layout(),
    }
}

fn npmneon() -> PanelSpec {
    let mut sms = query(
        "/ints/agent/res/data_smscdr.php",
        DateWindow::Today,
        "1",
        100,
        "desc",
    );
    sms.send_token = false;
    sms.extra = pairs(&[("frange", ""), ("fclient", ""), ("fg", "0")]);

    let mut numbers = query(
        "/ints/agent/res/data_smsnumbers.php",
        DateWindow::Since("2026-01-01".into()),
        "2",
        -1,
        "asc",
    );
    numbers.send_token = false;
    numbers.referer = Some("/ints/agent/MySMSNumbers".into());
    numbers.columns = Some(8);
    numbers.full_column_flags = true;
    numbers.unsortable_columns = vec![0, 7];
    numbers.extra = pairs(&[("frange", ""), ("fclient", "")]);

    PanelSpec {
        login_path: "/ints/login".into(),
        signin_path: "/ints/signin".into(),
        reports_path: None,
        reports_referer: None,
        user_agent: DEFAULT_USER_AGENT.into(),
        send_origin: false,
        headers: Vec::new(),
        token: TokenConfig {
            param: String::new(),
            patterns: Vec::new(),
            on_missing: OnMissingToken::Cookies,
            cookies_only: true,
        },
        sms,
        sms_layout: MessageLayout {
            min_fields: 8,
            currency: Field::Literal("$".into()),
            cost: Field::Column(6),
            status: Some(Field::Column(7)),
            message_strip: vec!["<#>".into(), "null".into()],
            ..agent_sms_layout()
        },
        numbers,
        numbers_layout: agent_inventory_layout(),
    }
}

fn numberpanel() -> PanelSpec {
    let mut numbers = query(
        "/NumberPanel/agent/res/data_smsnumberstats.php",
        DateWindow::MonthToDate,
        "1",
        -1,
        "asc",
    );
    numbers.send_token = false;

    PanelSpec {
        login_path: "/NumberPanel/login".into(),
        signin_path: "/NumberPanel/signin".into(),
        reports_path: Some("/NumberPanel/agent/SMSCDRReports".into()),
        reports_referer: None,
        user_agent: DEFAULT_USER_AGENT.into(),
        send_origin: false,
        headers: Vec::new(),
        token: token("sesskey", &[SESSKEY_PATTERN], OnMissingToken::Fail),
        sms: query(
            "/NumberPanel/agent/res/data_smscdr.php",
            DateWindow::MonthToDate,
            "2",
            100,
            "desc",
        ),
        sms_layout: agent_sms_layout(),
        numbers,
        // Stats rows: number, count, currency, price, status. The currency
        // column is left out on purpose; the inventory schema has six columns.
        numbers_layout: InventoryLayout {
            min_fields: 5,
            label: Field::CountryName,
            prefix: Field::CallingCode,
            number: 0,
            period: Field::Column(1),
            price: Field::Column(3),
            stats: Field::Column(4),
            strip_number_separators: false,
        },
    }
}

fn numberpanel1() -> PanelSpec {
    let mut sms = query(
        "/NumberPanel/client/res/data_smscdr.php",
        DateWindow::Fixed {
            from: "2026-01-07 00:00:00".into(),
            to: "2259-12-20 23:59:59".into(),
        },
        "2",
        -1,
        "desc",
    );
    sms.referer = Some("/NumberPanel/client/SMSCDRStats".into());
    sms.columns = Some(7);
    sms.full_column_flags = true;
    sms.extra = pairs(&[
        ("frange", ""),
        ("fnum", ""),
        ("fcli", ""),
        ("fgdate", ""),
        ("fgmonth", ""),
        ("fgrange", ""),
        ("fgnumber", ""),
        ("fgcli", ""),
        ("fg", "0"),
    ]);

    let mut numbers = query(
        "/NumberPanel/client/res/data_smsnumbers.php",
        DateWindow::None,
        "4",
        -1,
        "asc",
    );
    numbers.send_token = false;
    numbers.referer = Some("/NumberPanel/client/MySMSNumbers".into());
    numbers.columns = Some(6);
    numbers.full_column_flags = true;
    numbers.extra = pairs(&[("frange", ""), ("fclient", "")]);

    PanelSpec {
        login_path: "/NumberPanel/login".into(),
        signin_path: "/NumberPanel/signin".into(),
        reports_path: Some("/NumberPanel/client/SMSCDRStats".into()),
        reports_referer: Some("/NumberPanel/client/SMSDashboard".into()),
        user_agent: CHROME_MOBILE_UA.into(),
        send_origin: true,
        headers: pairs(&[("Accept-Language", "en-US,en;q=0.9,ur-PK;q=0.8,ur;q=0.7")]),
        token: token("sesskey", &[SESSKEY_PATTERN], OnMissingToken::Fail),
        sms,
        sms_layout: client_sms_layout(Field::Literal("$".into()), 5, 5),
        numbers,
        numbers_layout: client_inventory_layout(Field::BareText(5)),
    }
}

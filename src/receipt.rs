//! # Receipt Templates
//!
//! Built-in markup receipts for checking a printer from the command line.
//! Each template is plain markup text, ready for
//! [`ConnectionManager::print`](crate::ConnectionManager::print).

use chrono::Local;

/// Full-width rule for 32 columns.
const RULE: &str = "================================";
const DASHES: &str = "--------------------------------";

// ============================================================================
// RECEIPT TEMPLATES
// ============================================================================

/// Short test page stamped with the local time.
pub fn test_page() -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "[C]{RULE}\n\
         [C]<b>PRINTER TEST</b>\n\
         [C]{now}\n\
         [C]{RULE}"
    )
}

/// Every alignment and style the markup supports.
pub fn alignment_demo() -> String {
    [
        "[L]left".to_string(),
        "[C]center".to_string(),
        "[R]right".to_string(),
        DASHES.to_string(),
        "[L]<b>bold</b> <u>underline</u>".to_string(),
        "[L]<font size='wide'>wide</font>".to_string(),
        "[L]<font size='tall'>tall</font>".to_string(),
        "[C]<font size='big'>BIG</font>".to_string(),
        DASHES.to_string(),
        "[L]Americano[R]2".to_string(),
        "[L]Latte[C]|[R]1".to_string(),
    ]
    .join("\n")
}

/// Customer copy of a sample order.
pub fn order_demo() -> String {
    let items = [("아메리카노", 2), ("카페라떼", 1), ("Croissant", 3)];

    let mut text = format!(
        "[C]{RULE}\n\
         [L]\n\
         [C]<u><font size='big'>주문번호 : 42</font></u>\n\
         [L]\n\
         [C]{DASHES}\n\
         [L]\n"
    );
    for (name, count) in items {
        text.push_str(&format!("[L]<b>{name}</b>[R]{count}\n"));
    }
    text.push_str(&format!("[L]\n[C]{RULE}"));
    text
}

// ============================================================================
// LOOKUP FUNCTIONS
// ============================================================================

/// List available receipt templates
pub fn list_receipts() -> &'static [&'static str] {
    &["test", "alignment", "order"]
}

/// Get receipt markup by name
pub fn by_name(name: &str) -> Option<String> {
    match name.to_lowercase().as_str() {
        "test" => Some(test_page()),
        "alignment" => Some(alignment_demo()),
        "order" => Some(order_demo()),
        _ => None,
    }
}

/// Check if a name is a receipt template
pub fn is_receipt(name: &str) -> bool {
    list_receipts().contains(&name.to_lowercase().as_str())
}

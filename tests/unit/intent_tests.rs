//! Text to intent classification.

use daily_nudge::intent::Intent;

#[test]
fn confirmation_words() {
    for text in ["done", "Yes", "OK", "took it", "飲んだ", "はい"] {
        assert_eq!(Intent::parse(text), Intent::Confirm, "{text}");
    }
}

#[test]
fn delete_words() {
    for text in ["delete", "Stop", "unsubscribe please", "削除"] {
        assert_eq!(Intent::parse(text), Intent::Delete, "{text}");
    }
}

#[test]
fn fixed_phrases() {
    assert_eq!(Intent::parse("My Code"), Intent::ShowContactCode);
    assert_eq!(Intent::parse("clear contacts"), Intent::ClearContacts);
    assert_eq!(Intent::parse(" status "), Intent::Query);
    assert_eq!(Intent::parse("設定教えて"), Intent::Query);
}

#[test]
fn full_width_colon_is_accepted() {
    assert_eq!(Intent::parse("6：30"), Intent::SetTime { hour: 6, minute: 30 });
}

#[test]
fn contact_code_is_trimmed() {
    assert_eq!(
        Intent::parse("  contact: U42 "),
        Intent::RegisterContactRequest {
            contact_id: "U42".into()
        }
    );
}

#[test]
fn anything_else_is_unknown() {
    assert_eq!(
        Intent::parse("good morning"),
        Intent::Unknown("good morning".into())
    );
}

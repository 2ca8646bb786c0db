use calmform::FormFields;

#[allow(dead_code)]
#[derive(Clone, calmform::FormFields)]
struct DemoForm {
    email: String,
}

fn main() {
    let fields = DemoForm::fields();
    assert_eq!(fields.email().as_str(), "email");
    assert_eq!(fields.email().to_string(), "email");
}

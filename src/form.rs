use crate::config::Credentials;

#[derive(Debug, Clone, Default)]
pub struct InputField {
    pub label: &'static str,
    pub value: String,
    pub masked: bool,
}

impl InputField {
    fn new(label: &'static str, value: &str, masked: bool) -> Self {
        Self {
            label,
            value: value.to_string(),
            masked,
        }
    }

    pub fn push(&mut self, ch: char) {
        self.value.push(ch);
    }

    pub fn pop(&mut self) {
        self.value.pop();
    }

    /// What the field shows on screen; secrets keep only their last four characters.
    pub fn display(&self) -> String {
        if !self.masked {
            return self.value.clone();
        }
        let count = self.value.chars().count();
        let visible: String = self.value.chars().skip(count.saturating_sub(4)).collect();
        format!("{}{visible}", "•".repeat(count.saturating_sub(4)))
    }
}

/// Credential entry form: API key then group id.
#[derive(Debug, Clone)]
pub struct ConfigForm {
    pub fields: [InputField; 2],
    pub focus: usize,
    pub error: Option<String>,
}

impl ConfigForm {
    pub fn new(current: &Credentials) -> Self {
        Self {
            fields: [
                InputField::new("MiniMax API Key", &current.secret, true),
                InputField::new("MiniMax Group ID", &current.group_id, false),
            ],
            focus: 0,
            error: None,
        }
    }

    pub fn focused_mut(&mut self) -> &mut InputField {
        &mut self.fields[self.focus]
    }

    pub fn focus_next(&mut self) {
        if self.focus + 1 < self.fields.len() {
            self.focus += 1;
        }
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.saturating_sub(1);
    }

    pub fn on_last_field(&self) -> bool {
        self.focus + 1 == self.fields.len()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.fields[0].value.trim(),
            self.fields[1].value.trim(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_starts_from_current_credentials() {
        let form = ConfigForm::new(&Credentials::new("secret", "group"));
        assert_eq!(form.fields[0].value, "secret");
        assert_eq!(form.fields[1].value, "group");
        assert_eq!(form.focus, 0);
    }

    #[test]
    fn focus_stays_in_bounds() {
        let mut form = ConfigForm::new(&Credentials::default());
        form.focus_prev();
        assert_eq!(form.focus, 0);
        form.focus_next();
        form.focus_next();
        assert_eq!(form.focus, 1);
        assert!(form.on_last_field());
    }

    #[test]
    fn typed_values_are_trimmed() {
        let mut form = ConfigForm::new(&Credentials::default());
        for ch in " key ".chars() {
            form.focused_mut().push(ch);
        }
        form.focus_next();
        for ch in "grp\t".chars() {
            form.focused_mut().push(ch);
        }
        assert_eq!(form.credentials(), Credentials::new("key", "grp"));
    }

    #[test]
    fn secret_is_masked_except_the_tail() {
        let form = ConfigForm::new(&Credentials::new("abcdefgh", "g"));
        assert_eq!(form.fields[0].display(), "••••efgh");
        assert_eq!(form.fields[1].display(), "g");
    }
}

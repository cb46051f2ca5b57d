//! HTML pages served by the auth server.

const PAGE_STYLE: &str = r#"
        :root {
            --font-dm-sans: 'DM Sans', -apple-system, BlinkMacSystemFont, 'Helvetica Neue', Helvetica, Arial, sans-serif;
        }
        body {
            font-family: var(--font-dm-sans);
            background: #fef8f1;
            margin: 0;
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
        }
        .card {
            background: white;
            border-radius: 16px;
            padding: 40px;
            box-shadow: 0 20px 40px rgba(0,0,0,0.1);
            max-width: 420px;
            width: 100%;
            margin: 20px;
            border: 1px solid #dee8c2;
        }
        .logo { text-align: center; margin-bottom: 30px; }
        .logo img { width: 48px; height: 48px; }
        .logo h1 { margin: 10px 0 0 0; color: #485b10; font-size: 24px; font-weight: 600; }
        .form-group { margin-bottom: 20px; }
        .form-group label { display: block; margin-bottom: 8px; color: #485b10; font-weight: 500; }
        .form-group input, .form-group select {
            width: 100%;
            padding: 12px 16px;
            border: 2px solid #efede5;
            border-radius: 8px;
            font-size: 16px;
            box-sizing: border-box;
            background: #fef8f1;
        }
        .form-group input:focus, .form-group select:focus { outline: none; border-color: #485b10; background: white; }
        .form-row { display: flex; gap: 15px; }
        .form-row .form-group { flex: 1; }
        .otp-input { text-align: center; font-size: 18px; letter-spacing: 4px; }
        .btn {
            width: 100%;
            background: #485b10;
            color: white;
            border: none;
            padding: 14px;
            border-radius: 8px;
            font-size: 16px;
            font-weight: 600;
            cursor: pointer;
        }
        .btn:hover { background: #3a4a0d; }
        .btn:disabled { background: #9ca3af; cursor: not-allowed; }
        .error { color: #ef4444; font-size: 14px; margin-top: 8px; }
        .success { color: #10b981; font-size: 14px; margin-top: 8px; }
        .agent-id { background: #dee8c2; padding: 12px; border-radius: 8px; font-family: monospace; font-size: 14px; color: #485b10; }
        .session-name { display: flex; gap: 8px; }
        .session-name button { background: #efede5; border: none; border-radius: 8px; padding: 0 14px; cursor: pointer; color: #485b10; }
        .branding { text-align: center; margin-top: 20px; color: #485b10; font-size: 14px; background: #dee8c2; padding: 12px; border-radius: 8px; }
        .branding img { width: 20px; height: 20px; vertical-align: middle; margin-right: 8px; }
        p { color: #485b10; }
"#;

/// Posts the form's JSON to `endpoint`, then follows `redirect_url` on success.
const SUBMIT_SCRIPT: &str = r#"
        function submitJson(endpoint, payload, button, busyLabel, idleLabel, okText) {
            const messageDiv = document.getElementById('message');
            button.disabled = true;
            button.textContent = busyLabel;
            fetch(endpoint, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(payload)
            })
            .then(response => response.json())
            .then(data => {
                if (data.success) {
                    messageDiv.innerHTML = '<div class="success">' + okText + '</div>';
                    setTimeout(() => { window.location.href = data.redirect_url; }, 1000);
                } else {
                    messageDiv.innerHTML = '<div class="error">' + data.message + '</div>';
                    button.disabled = false;
                    button.textContent = idleLabel;
                }
            })
            .catch(() => {
                messageDiv.innerHTML = '<div class="error">Request failed. Please try again.</div>';
                button.disabled = false;
                button.textContent = idleLabel;
            });
        }
"#;

const LOGIN_BODY: &str = r#"
    <div class="card">
        <div class="logo">
            <img src="/auth/logo/kite" alt="Kite Logo">
            <h1>Kite</h1>
        </div>
        <form id="emailForm">
            <div class="form-group">
                <label for="email">Email Address</label>
                <input type="email" id="email" name="email" placeholder="Enter your email address" required>
            </div>
            <button type="submit" class="btn" id="emailBtn">Continue</button>
            <div id="message"></div>
        </form>
    </div>
    <script>
        document.getElementById('emailForm').addEventListener('submit', function(e) {
            e.preventDefault();
            const email = document.getElementById('email').value;
            if (!email) {
                document.getElementById('message').innerHTML = '<div class="error">Please enter your email address</div>';
                return;
            }
            submitJson('/auth/email', { email }, document.getElementById('emailBtn'),
                'Sending...', 'Continue', 'Email sent! Redirecting to verification...');
        });
    </script>
"#;

const VERIFY_BODY: &str = r#"
    <div class="card">
        <div class="logo">
            <img src="/auth/logo/kite" alt="Kite Logo">
            <h1>Kite</h1>
        </div>
        <form id="otpForm">
            <div class="form-group">
                <label for="otp">Enter 6-digit verification code</label>
                <input type="text" id="otp" name="otp" class="otp-input" placeholder="000000" maxlength="6" pattern="[0-9]{6}">
            </div>
            <button type="submit" class="btn" id="verifyBtn">Verify</button>
            <div id="message"></div>
            <div class="branding">
                <img src="/auth/logo/privy" alt="Privy Logo">
                Powered by Privy
            </div>
        </form>
    </div>
    <script>
        document.getElementById('otp').addEventListener('input', function() {
            this.value = this.value.replace(/[^0-9]/g, '');
        });
        document.getElementById('otpForm').addEventListener('submit', function(e) {
            e.preventDefault();
            const otp = document.getElementById('otp').value;
            if (otp.length !== 6) {
                document.getElementById('message').innerHTML = '<div class="error">Please enter a 6-digit code</div>';
                return;
            }
            submitJson('/auth/verify', { otp }, document.getElementById('verifyBtn'),
                'Verifying...', 'Verify', 'Verification successful! Redirecting...');
        });
    </script>
"#;

const CONFIGURE_BODY: &str = r#"
    <div class="card">
        <div class="logo">
            <img src="/auth/logo/kite" alt="Kite Logo">
            <h1>Session Configuration</h1>
        </div>
        <form id="configForm">
            <div class="form-group">
                <label>Agent ID</label>
                <div class="agent-id" id="agentId">{{ agent_id }}</div>
            </div>
            <div class="form-group">
                <label for="sessionName">Session Name</label>
                <div class="session-name">
                    <input type="text" id="sessionName" name="sessionName" placeholder="Enter session name" readonly>
                    <button type="button" id="editSessionBtn" onclick="toggleSessionEdit()">Edit</button>
                </div>
            </div>
            <div class="form-group">
                <label for="maxBudget">Budget ($)</label>
                <input type="number" id="maxBudget" name="maxBudget" min="1" max="10000" value="1000" required>
            </div>
            <div class="form-row">
                <div class="form-group">
                    <label for="expirationType">Expiration Type</label>
                    <select id="expirationType" name="expirationType" required>
                        <option value="duration">Duration</option>
                        <option value="datetime">Specific Date &amp; Time</option>
                    </select>
                </div>
                <div class="form-group" id="durationGroup">
                    <label for="duration">Duration (hours)</label>
                    <input type="number" id="duration" name="duration" min="1" max="168" value="24">
                </div>
                <div class="form-group" id="datetimeGroup" style="display: none;">
                    <label for="expirationDate">Expiration Date</label>
                    <input type="datetime-local" id="expirationDate" name="expirationDate">
                </div>
            </div>
            <button type="submit" class="btn" id="configBtn">Configure Session</button>
            <div id="message"></div>
        </form>
    </div>
    <script>
        const username = '{{ username_js }}';
        const agentId = document.getElementById('agentId').textContent;
        const randomHash = Math.random().toString(36).substring(2, 8);
        document.getElementById('sessionName').value = `${agentId}-${randomHash}`;

        const tomorrow = new Date();
        tomorrow.setHours(tomorrow.getHours() + 24);
        document.getElementById('expirationDate').value = tomorrow.toISOString().slice(0, 16);

        function toggleSessionEdit() {
            const input = document.getElementById('sessionName');
            const button = document.getElementById('editSessionBtn');
            input.readOnly = !input.readOnly;
            button.textContent = input.readOnly ? 'Edit' : 'Done';
            if (!input.readOnly) { input.focus(); }
        }

        document.getElementById('expirationType').addEventListener('change', function() {
            const byDuration = this.value === 'duration';
            document.getElementById('durationGroup').style.display = byDuration ? 'block' : 'none';
            document.getElementById('datetimeGroup').style.display = byDuration ? 'none' : 'block';
        });

        document.getElementById('configForm').addEventListener('submit', function(e) {
            e.preventDefault();
            const payload = {
                username,
                sessionName: document.getElementById('sessionName').value,
                maxBudget: parseFloat(document.getElementById('maxBudget').value),
                expirationType: document.getElementById('expirationType').value,
                duration: parseInt(document.getElementById('duration').value),
                expirationDate: document.getElementById('expirationDate').value
            };
            submitJson('/auth/configure', payload, document.getElementById('configBtn'),
                'Configuring Session...', 'Configure Session', 'Session configured successfully! Redirecting...');
        });
    </script>
"#;

const COMPLETE_BODY: &str = r#"
    <div class="card" style="text-align: center;">
        <div class="logo">
            <img src="/auth/logo/kite" alt="Kite Logo">
        </div>
        <h1 style="color: #485b10;">&#9989; Authentication Complete</h1>
        <p>Welcome back, <strong>{{ username }}</strong>!</p>
        <p class="branding">Redirecting you back to the shopping agent...</p>
    </div>
    <script>
        setTimeout(() => { window.location.href = '{{ redirect_js }}'; }, 2000);
    </script>
"#;

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escapes for a single-quoted JavaScript string literal inside a `<script>`.
pub fn escape_js(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    \
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n    \
         <title>{}</title>\n    <style>{}</style>\n    <script>{}</script>\n</head>\n<body>{}</body>\n</html>\n",
        title, PAGE_STYLE, SUBMIT_SCRIPT, body
    )
}

pub fn login_page() -> String {
    page("Kite Login", LOGIN_BODY)
}

pub fn verify_page() -> String {
    page("Kite Verification", VERIFY_BODY)
}

pub fn configure_page(username: &str) -> String {
    let body = CONFIGURE_BODY
        .replace("{{ agent_id }}", &escape_html(&crate::model::agent_id_for(username)))
        .replace("{{ username_js }}", &escape_js(username));
    page("Agent Configuration", &body)
}

pub fn complete_page(username: &str, redirect_url: &str) -> String {
    let body = COMPLETE_BODY
        .replace("{{ username }}", &escape_html(username))
        .replace("{{ redirect_js }}", &escape_js(redirect_url));
    page("Authentication Complete", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_page_escapes_username() {
        let html = configure_page("<script>x</script>");
        assert!(html.contains("BuyWhenReady-gemini-&lt;script&gt;x&lt;/script&gt;"));
        assert!(!html.contains("gemini-<script>"));
    }

    #[test]
    fn test_complete_page_mentions_user_and_target() {
        let html = complete_page("shopper", "http://localhost:8000");
        assert!(html.contains("Welcome back, <strong>shopper</strong>!"));
        assert!(html.contains("window.location.href = 'http://localhost:8000'"));
    }

    #[test]
    fn test_escape_js() {
        assert_eq!(escape_js("it's"), "it\\'s");
        assert_eq!(escape_js("</script>"), "\\u003c/script\\u003e");
    }
}

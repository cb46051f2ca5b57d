//! The single-page chat UI. The auth widget is injected after `<body>`.

pub const CHAT_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Shopping Agent: BuyWhenReady</title>
    <style>
        body {
            margin: 0;
            font-family: 'DM Sans', -apple-system, BlinkMacSystemFont, 'Helvetica Neue', Arial, sans-serif;
            background: #14170f;
            color: #eceee6;
            height: 100vh;
            display: flex;
            flex-direction: column;
        }
        header { padding: 20px 32px; border-bottom: 1px solid #2b3120; }
        header h1 { margin: 0; font-size: 20px; color: #c9dc8f; }
        header p { margin: 4px 0 0 0; font-size: 13px; color: #8d9679; }
        #messages { flex: 1; overflow-y: auto; padding: 24px 32px; display: flex; flex-direction: column; gap: 12px; }
        .message { max-width: 72%; padding: 12px 16px; border-radius: 14px; line-height: 1.5; font-size: 15px; }
        .message.user { align-self: flex-end; background: #485b10; color: #fff; }
        .message.agent { align-self: flex-start; background: #232819; border: 1px solid #2f3623; }
        .message.agent code { background: #14170f; padding: 1px 5px; border-radius: 4px; }
        .message.agent ul { margin: 6px 0; padding-left: 20px; }
        .message.error { align-self: flex-start; background: #3b1616; color: #f3b4b4; }
        .typing { align-self: flex-start; color: #8d9679; font-size: 13px; }
        form { display: flex; gap: 10px; padding: 16px 32px 24px; border-top: 1px solid #2b3120; }
        #input {
            flex: 1; padding: 12px 16px; border-radius: 10px; border: 1px solid #343b27;
            background: #1c2014; color: #eceee6; font-size: 15px;
        }
        #input:focus { outline: none; border-color: #8aa33a; }
        #send { padding: 12px 22px; border: none; border-radius: 10px; background: #8aa33a; color: #14170f; font-weight: 600; cursor: pointer; }
        #send:disabled { background: #4a5237; cursor: not-allowed; }
    </style>
</head>
<body>
    <header>
        <h1>BuyWhenReady</h1>
        <p>Tell the agent what you want to buy. It will find options, confirm your address and pay with your Kite wallet.</p>
    </header>
    <div id="messages">
        <div class="message agent">Hi! What are you shopping for today?</div>
    </div>
    <form id="chat-form">
        <input id="input" type="text" placeholder="e.g. running shoes under $100" autocomplete="off" autofocus>
        <button id="send" type="submit">Send</button>
    </form>
    <script>
        const messages = document.getElementById('messages');
        const input = document.getElementById('input');
        const send = document.getElementById('send');
        const userId = localStorage.getItem('bwr_user_id') || ('user_' + Math.random().toString(36).slice(2, 10));
        localStorage.setItem('bwr_user_id', userId);

        function append(kind, html) {
            const div = document.createElement('div');
            div.className = 'message ' + kind;
            div.innerHTML = html;
            messages.appendChild(div);
            messages.scrollTop = messages.scrollHeight;
            return div;
        }

        function appendText(kind, text) {
            const div = append(kind, '');
            div.textContent = text;
        }

        document.getElementById('chat-form').addEventListener('submit', async (event) => {
            event.preventDefault();
            const text = input.value.trim();
            if (!text) return;
            appendText('user', text);
            input.value = '';
            send.disabled = true;

            const typing = document.createElement('div');
            typing.className = 'typing';
            typing.textContent = 'Agent is thinking...';
            messages.appendChild(typing);

            try {
                const res = await fetch('/api/chat', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    credentials: 'same-origin',
                    body: JSON.stringify({ message: text, user_id: userId })
                });
                const data = await res.json();
                typing.remove();
                append(res.ok ? 'agent' : 'error', data.response);
            } catch (err) {
                typing.remove();
                appendText('error', 'Could not reach the shopping agent.');
            } finally {
                send.disabled = false;
                input.focus();
            }
        });
    </script>
</body>
</html>
"#;
